//! Similarity retrieval against a sealed index.
//!
//! [`planner`] turns a query into its n-gram multiset and the admissible
//! bucket sizes; [`executor`] walks those buckets and yields [`Match`]es
//! lazily.

pub mod executor;
pub mod planner;

pub use executor::Matches;
pub use planner::QueryPlan;

use crate::error::Result;
use crate::index::reader::IndexReader;
use crate::index::types::{BucketSize, StringId};
use crate::measure::Measure;
use std::borrow::Cow;

/// A query string with the measure and threshold to evaluate it under
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Query<'q> {
    /// Raw query bytes, cut into grams the same way inserted strings are
    pub text: &'q [u8],
    pub measure: Measure,
    /// Ignored by [`Measure::Exact`]
    pub threshold: f64,
}

impl<'q> Query<'q> {
    pub fn new(text: &'q str, measure: Measure, threshold: f64) -> Self {
        Self::from_bytes(text.as_bytes(), measure, threshold)
    }

    pub fn from_bytes(text: &'q [u8], measure: Measure, threshold: f64) -> Self {
        Self {
            text,
            measure,
            threshold,
        }
    }

    pub fn exact(text: &'q str) -> Self {
        Self::new(text, Measure::Exact, 1.0)
    }
}

/// One retrieved string
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'a> {
    pub id: StringId,
    /// Stored bytes of the string; see [`Match::text`]
    pub bytes: &'a [u8],
    /// Gram count of the matched string
    pub size: BucketSize,
    /// Grams shared with the query, counting multiplicity
    pub overlap: u32,
    pub score: f64,
}

impl<'a> Match<'a> {
    /// The matched string, with invalid UTF-8 replaced
    pub fn text(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.bytes)
    }
}

/// Retrieve every string satisfying `query`, ascending by bucket size, then
/// by insertion order
pub fn retrieve<'a>(reader: &'a IndexReader, query: &Query<'_>) -> Result<Matches<'a>> {
    let plan = QueryPlan::new(reader, query)?;
    Ok(Matches::new(reader, plan))
}

impl IndexReader {
    /// Retrieve the strings similar to `text`; see [`retrieve`]
    pub fn retrieve(&self, text: &str, measure: Measure, threshold: f64) -> Result<Matches<'_>> {
        retrieve(self, &Query::new(text, measure, threshold))
    }

    /// Retrieve the strings similar to raw query bytes
    pub fn retrieve_bytes(
        &self,
        text: &[u8],
        measure: Measure,
        threshold: f64,
    ) -> Result<Matches<'_>> {
        retrieve(self, &Query::from_bytes(text, measure, threshold))
    }

    /// Collect the matched strings of a query
    pub fn retrieve_strings(
        &self,
        text: &str,
        measure: Measure,
        threshold: f64,
    ) -> Result<Vec<String>> {
        Ok(self
            .retrieve(text, measure, threshold)?
            .map(|m| m.text().into_owned())
            .collect())
    }
}
