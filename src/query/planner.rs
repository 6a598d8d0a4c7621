//! Query planning: turn a query into its multiset and the range of buckets
//! worth scanning.

use crate::error::Result;
use crate::index::reader::IndexReader;
use crate::index::types::BucketSize;
use crate::measure::{Measure, SizeRange};
use crate::ngram::NgramMultiset;
use crate::query::Query;

/// Everything the executor needs to evaluate one query
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub grams: NgramMultiset,
    pub measure: Measure,
    pub threshold: f64,
    /// Admissible candidate sizes; empty when nothing can match
    pub sizes: SizeRange,
}

impl QueryPlan {
    pub fn new(reader: &IndexReader, query: &Query<'_>) -> Result<Self> {
        query.measure.check_threshold(query.threshold)?;

        let grams = reader.generator().generate_bytes(query.text);
        let k = grams.size();
        let sizes = if k == 0 {
            SizeRange { min: 1, max: 0 }
        } else {
            query.measure.size_range(k, query.threshold)
        };

        Ok(Self {
            grams,
            measure: query.measure,
            threshold: query.threshold,
            sizes,
        })
    }

    /// Query size `k`
    pub fn size(&self) -> u32 {
        self.grams.size()
    }

    /// Minimum overlap for candidates of size `m`, or `None` if no overlap a
    /// size-`m` string can have reaches the threshold
    pub fn min_overlap(&self, m: BucketSize) -> Option<u32> {
        let k = self.size();
        if !self.sizes.contains(m) {
            return None;
        }
        if self.measure == Measure::Exact {
            return (m == k).then_some(k);
        }
        let o_min = self.measure.min_overlap(k, m, self.threshold);
        (o_min <= k.min(m)).then_some(o_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{CharWidth, IndexConfig};
    use crate::index::writer::IndexWriter;
    use tempfile::TempDir;

    fn reader(dir: &TempDir) -> IndexReader {
        let path = dir.path().join("db");
        let mut writer = IndexWriter::open_for_write(&path, IndexConfig::new(2, CharWidth::Narrow)).unwrap();
        writer.insert("cat").unwrap();
        writer.finalize().unwrap();
        IndexReader::open(&path).unwrap()
    }

    #[test]
    fn test_exact_plan_targets_one_bucket() {
        let dir = TempDir::new().unwrap();
        let reader = reader(&dir);
        let plan = QueryPlan::new(&reader, &Query::new("cat", Measure::Exact, 0.0)).unwrap();
        assert_eq!(plan.size(), 4);
        assert_eq!(plan.sizes, SizeRange { min: 4, max: 4 });
        assert_eq!(plan.min_overlap(4), Some(4));
        assert_eq!(plan.min_overlap(5), None);
    }

    #[test]
    fn test_dice_plan() {
        let dir = TempDir::new().unwrap();
        let reader = reader(&dir);
        let plan = QueryPlan::new(&reader, &Query::new("cat", Measure::Dice, 0.5)).unwrap();
        assert_eq!(plan.sizes, SizeRange { min: 2, max: 12 });
        // ⌈0.25 · (4 + 5)⌉
        assert_eq!(plan.min_overlap(5), Some(3));
        assert_eq!(plan.min_overlap(13), None);
    }

    #[test]
    fn test_bad_threshold_rejected() {
        let dir = TempDir::new().unwrap();
        let reader = reader(&dir);
        assert!(QueryPlan::new(&reader, &Query::new("cat", Measure::Cosine, 2.0)).is_err());
        assert!(QueryPlan::new(&reader, &Query::new("cat", Measure::Exact, 2.0)).is_ok());
    }
}
