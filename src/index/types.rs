use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identifier of an inserted string, assigned in insertion order from 0
pub type StringId = u32;

/// Number of n-grams in a string's multiset; the key of a bucket
pub type BucketSize = u32;

/// On-disk format version written to meta.json
pub const FORMAT_VERSION: u32 = 1;

pub const META_FILE: &str = "meta.json";
pub const STRINGS_FILE: &str = "strings.bin";
pub const STRING_OFFSETS_FILE: &str = "strings.idx";
pub const BUCKETS_FILE: &str = "buckets.bin";
pub const BUCKETS_DIR: &str = "buckets";

/// File names of the dictionary and postings of bucket `size`
pub fn bucket_file_names(size: BucketSize) -> (String, String) {
    (format!("b{:05}.dict", size), format!("b{:05}.postings", size))
}

/// Code unit width used to cut strings into n-grams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CharWidth {
    /// One unit per UTF-8 byte
    #[default]
    Narrow,
    /// One unit per Unicode scalar value, stored as 4 bytes
    Wide,
}

impl CharWidth {
    /// Bytes used to encode a single code unit in a gram
    pub fn unit_bytes(self) -> usize {
        match self {
            CharWidth::Narrow => 1,
            CharWidth::Wide => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CharWidth::Narrow => "narrow",
            CharWidth::Wide => "wide",
        }
    }
}

impl fmt::Display for CharWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CharWidth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "narrow" | "char" => Ok(CharWidth::Narrow),
            "wide" | "wchar" => Ok(CharWidth::Wide),
            other => Err(Error::config(format!("unknown character type: {other}"))),
        }
    }
}

/// Build-time parameters of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub ngram_length: usize,
    pub char_width: CharWidth,
    /// Clamp on the multiplicity of any single gram; `None` counts every occurrence
    #[serde(default)]
    pub max_multiplicity: Option<u32>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ngram_length: 3,
            char_width: CharWidth::Narrow,
            max_multiplicity: None,
        }
    }
}

impl IndexConfig {
    pub fn new(ngram_length: usize, char_width: CharWidth) -> Self {
        Self {
            ngram_length,
            char_width,
            max_multiplicity: None,
        }
    }

    pub fn with_max_multiplicity(mut self, cap: Option<u32>) -> Self {
        self.max_multiplicity = cap;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ngram_length < 1 {
            return Err(Error::config(format!(
                "n-gram length must be at least 1, got {}",
                self.ngram_length
            )));
        }
        // Grams are stored with a u16 width prefix in the dictionary header
        if self.ngram_length * self.char_width.unit_bytes() > u16::MAX as usize {
            return Err(Error::config(format!(
                "n-gram length {} is too large",
                self.ngram_length
            )));
        }
        if self.max_multiplicity == Some(0) {
            return Err(Error::config("multiplicity cap must be at least 1"));
        }
        Ok(())
    }

    /// Width in bytes of one encoded gram
    pub fn gram_bytes(&self) -> usize {
        self.ngram_length * self.char_width.unit_bytes()
    }
}

/// Per-bucket entry recorded in meta.json
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketMeta {
    pub size: BucketSize,
    pub members: u32,
    pub grams: u32,
    pub postings_bytes: u64,
}

/// Index metadata stored in meta.json; written last, so its presence marks a sealed index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub config: IndexConfig,
    pub string_count: u32,
    pub strings_bytes: u64,
    pub buckets: Vec<BucketMeta>,
    pub created_at: u64,
}

impl IndexMeta {
    pub fn bucket(&self, size: BucketSize) -> Option<&BucketMeta> {
        self.buckets
            .binary_search_by_key(&size, |b| b.size)
            .ok()
            .map(|i| &self.buckets[i])
    }
}

/// Outcome of a successful finalize
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSummary {
    pub string_count: u32,
    pub bucket_count: usize,
    pub elapsed: Duration,
}
