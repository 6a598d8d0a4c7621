use crate::index::reader::{BucketReader, IndexReader, PostingList};
use crate::index::types::{BucketSize, StringId};
use crate::query::Match;
use crate::query::planner::QueryPlan;
use rustc_hash::FxHashMap;
use std::iter::FusedIterator;
use tracing::trace;

/// Lazy, forward-only sequence of matches.
///
/// Buckets are evaluated one at a time, ascending by size, and only when the
/// caller asks for more output; dropping the iterator stops all further work.
pub struct Matches<'a> {
    reader: &'a IndexReader,
    plan: QueryPlan,
    buckets: std::slice::Iter<'a, BucketReader>,
    current: BucketSize,
    pending: std::vec::IntoIter<(StringId, u32)>,
}

impl<'a> Matches<'a> {
    pub(crate) fn new(reader: &'a IndexReader, plan: QueryPlan) -> Self {
        let buckets = if plan.sizes.is_empty() {
            &[][..]
        } else {
            reader.buckets_between(plan.sizes.min, plan.sizes.max)
        };
        Self {
            reader,
            plan,
            buckets: buckets.iter(),
            current: 0,
            pending: Vec::new().into_iter(),
        }
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }
}

impl<'a> Iterator for Matches<'a> {
    type Item = Match<'a>;

    fn next(&mut self) -> Option<Match<'a>> {
        loop {
            if let Some((id, overlap)) = self.pending.next() {
                let Some(bytes) = self.reader.string_bytes(id) else {
                    continue;
                };
                let k = self.plan.size();
                return Some(Match {
                    id,
                    bytes,
                    size: self.current,
                    overlap,
                    score: self.plan.measure.score(k, self.current, overlap),
                });
            }

            let bucket = self.buckets.next()?;
            self.current = bucket.size();
            self.pending = evaluate_bucket(bucket, &self.plan).into_iter();
        }
    }
}

impl FusedIterator for Matches<'_> {}

/// Find the members of `bucket` that pass the plan, with their overlaps, in
/// ascending id order.
///
/// Query grams are visited shortest posting list first. Only the leading
/// lists that a passing string cannot avoid generate candidates; the
/// remaining lists are searched per candidate, and a candidate is dropped as
/// soon as its overlap plus what the unvisited lists could add falls below
/// the minimum.
pub(crate) fn evaluate_bucket(bucket: &BucketReader, plan: &QueryPlan) -> Vec<(StringId, u32)> {
    let Some(o_min) = plan.min_overlap(bucket.size()) else {
        return Vec::new();
    };

    let mut lists: Vec<(PostingList<'_>, u32)> = plan
        .grams
        .iter()
        .map(|(gram, count)| (bucket.postings(gram), count))
        .filter(|(list, _)| !list.is_empty())
        .collect();
    lists.sort_by_key(|(list, _)| list.len());

    if o_min == 0 {
        return overlap_all(bucket, &lists);
    }

    // rest[i]: the most that lists[i..] can add to any overlap
    let mut rest = vec![0u32; lists.len() + 1];
    for i in (0..lists.len()).rev() {
        rest[i] = rest[i + 1] + lists[i].1;
    }
    if rest[0] < o_min {
        return Vec::new();
    }

    // A string missing from lists[..i] needs rest[i] >= o_min to pass
    let signature = rest.partition_point(|&r| r >= o_min);

    let mut acc: FxHashMap<StringId, u32> = FxHashMap::default();
    for (list, q) in &lists[..signature] {
        for (id, count) in list.iter() {
            *acc.entry(id).or_insert(0) += count.min(*q);
        }
    }
    let mut candidates: Vec<(StringId, u32)> = acc.into_iter().collect();
    candidates.sort_unstable_by_key(|&(id, _)| id);

    for (i, (list, q)) in lists.iter().enumerate().skip(signature) {
        candidates.retain(|&(_, o)| o + rest[i] >= o_min);
        if candidates.is_empty() {
            break;
        }
        let postings = list.decode();
        for (id, o) in candidates.iter_mut() {
            if let Ok(pos) = postings.binary_search_by_key(id, |&(pid, _)| pid) {
                *o += postings[pos].1.min(*q);
            }
        }
    }
    candidates.retain(|&(_, o)| o >= o_min);

    trace!(
        size = bucket.size(),
        o_min,
        signature,
        matched = candidates.len(),
        "bucket evaluated"
    );
    candidates
}

/// Every member passes; compute each overlap, zero included
fn overlap_all(bucket: &BucketReader, lists: &[(PostingList<'_>, u32)]) -> Vec<(StringId, u32)> {
    let mut acc: FxHashMap<StringId, u32> = FxHashMap::default();
    for (list, q) in lists {
        for (id, count) in list.iter() {
            *acc.entry(id).or_insert(0) += count.min(*q);
        }
    }
    bucket
        .members()
        .iter()
        .map(|&id| (id, acc.get(&id).copied().unwrap_or(0)))
        .collect()
}
