//! Similarity measures over n-gram multisets.
//!
//! Each measure scores a query of size `k` against a candidate of size `m`
//! sharing `o` grams, and inverts that score into the bounds the query
//! engine prunes with: a range of admissible candidate sizes and a minimum
//! overlap per size.
//!
//! | measure | score | min overlap |
//! |---------|-------|-------------|
//! | exact   | identical multisets | `k` |
//! | dice    | `2o / (k + m)` | `⌈τ(k + m) / 2⌉` |
//! | cosine  | `o / √(km)` | `⌈τ√(km)⌉` |
//! | jaccard | `o / (k + m − o)` | `⌈τ(k + m) / (1 + τ)⌉` |
//! | overlap | `o / min(k, m)` | `⌈τ·min(k, m)⌉` |
//!
//! All bounds round outward by [`EPSILON`] so that float error can only
//! admit more candidates, never drop a true match. The match decision itself
//! is the integer test `o >= min_overlap(k, m)`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slack applied to every bound before rounding
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    #[default]
    Exact,
    Dice,
    Cosine,
    Jaccard,
    Overlap,
}

/// Inclusive range of candidate bucket sizes worth scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    pub min: u32,
    pub max: u32,
}

impl SizeRange {
    pub fn contains(&self, m: u32) -> bool {
        self.min <= m && m <= self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

#[inline]
fn ceil_out(x: f64) -> f64 {
    (x - EPSILON).ceil()
}

#[inline]
fn floor_out(x: f64) -> f64 {
    (x + EPSILON).floor()
}

/// Clamp a non-negative float bound into `u32`
#[inline]
fn to_u32(x: f64) -> u32 {
    if x <= 0.0 {
        0
    } else if x >= u32::MAX as f64 {
        u32::MAX
    } else {
        x as u32
    }
}

impl Measure {
    pub const ALL: [Measure; 5] = [
        Measure::Exact,
        Measure::Dice,
        Measure::Cosine,
        Measure::Jaccard,
        Measure::Overlap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Measure::Exact => "exact",
            Measure::Dice => "dice",
            Measure::Cosine => "cosine",
            Measure::Jaccard => "jaccard",
            Measure::Overlap => "overlap",
        }
    }

    /// Reject thresholds the bounds cannot work with. Exact ignores the threshold.
    pub fn check_threshold(self, threshold: f64) -> Result<()> {
        if self == Measure::Exact {
            return Ok(());
        }
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(Error::config(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(())
    }

    /// Similarity of a size-`m` candidate sharing `o` grams with a size-`k` query
    pub fn score(self, k: u32, m: u32, o: u32) -> f64 {
        let (k, m, o) = (k as f64, m as f64, o as f64);
        match self {
            Measure::Exact => {
                if k == m && o == k {
                    1.0
                } else {
                    0.0
                }
            }
            Measure::Dice => {
                if k + m == 0.0 {
                    0.0
                } else {
                    2.0 * o / (k + m)
                }
            }
            Measure::Cosine => {
                if k == 0.0 || m == 0.0 {
                    0.0
                } else {
                    o / (k * m).sqrt()
                }
            }
            Measure::Jaccard => {
                let union = k + m - o;
                if union <= 0.0 { 0.0 } else { o / union }
            }
            Measure::Overlap => {
                let smaller = k.min(m);
                if smaller == 0.0 { 0.0 } else { o / smaller }
            }
        }
    }

    /// Candidate sizes for which the threshold is reachable at all
    pub fn size_range(self, k: u32, threshold: f64) -> SizeRange {
        let kf = k as f64;
        let t = threshold;
        let (min, max) = match self {
            Measure::Exact => return SizeRange { min: k, max: k },
            Measure::Dice => {
                let min = ceil_out(t * kf / (2.0 - t));
                let max = if t > 0.0 {
                    floor_out((2.0 - t) * kf / t)
                } else {
                    f64::INFINITY
                };
                (min, max)
            }
            Measure::Cosine => {
                let min = ceil_out(t * t * kf);
                let max = if t > 0.0 {
                    floor_out(kf / (t * t))
                } else {
                    f64::INFINITY
                };
                (min, max)
            }
            Measure::Jaccard => {
                let min = ceil_out(t * kf);
                let max = if t > 0.0 {
                    floor_out(kf / t)
                } else {
                    f64::INFINITY
                };
                (min, max)
            }
            Measure::Overlap => (1.0, f64::INFINITY),
        };
        // Every stored string has at least one gram
        let mut range = SizeRange {
            min: to_u32(min).max(1),
            max: to_u32(max),
        };

        // The reachable sizes form an interval; nudge the closed-form ends
        // outward wherever rounding left a reachable size outside it
        while range.min > 1 && self.reachable(k, range.min - 1, t) {
            range.min -= 1;
        }
        while range.max < u32::MAX && self.reachable(k, range.max + 1, t) {
            range.max += 1;
        }
        range
    }

    /// Whether any overlap a size-`m` candidate can have reaches the threshold
    pub fn reachable(self, k: u32, m: u32, threshold: f64) -> bool {
        self.min_overlap(k, m, threshold) <= k.min(m)
    }

    /// Fewest shared grams a size-`m` candidate needs against a size-`k` query
    pub fn min_overlap(self, k: u32, m: u32, threshold: f64) -> u32 {
        let (kf, mf, t) = (k as f64, m as f64, threshold);
        let bound = match self {
            Measure::Exact => return k,
            Measure::Dice => ceil_out(0.5 * t * (kf + mf)),
            Measure::Cosine => ceil_out(t * (kf * mf).sqrt()),
            Measure::Jaccard => ceil_out(t * (kf + mf) / (1.0 + t)),
            Measure::Overlap => ceil_out(t * kf.min(mf)),
        };
        to_u32(bound)
    }

    /// Whether a size-`m` candidate with overlap `o` passes; the one predicate
    /// shared by indexed retrieval and full scans
    pub fn is_match(self, k: u32, m: u32, o: u32, threshold: f64) -> bool {
        match self {
            Measure::Exact => k == m && o == k,
            _ => o >= self.min_overlap(k, m, threshold),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Measure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Measure::Exact),
            "dice" => Ok(Measure::Dice),
            "cosine" => Ok(Measure::Cosine),
            "jaccard" => Ok(Measure::Jaccard),
            "overlap" => Ok(Measure::Overlap),
            other => Err(Error::config(format!("unknown similarity measure: {other}"))),
        }
    }
}
