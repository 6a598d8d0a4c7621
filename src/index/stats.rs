use crate::index::reader::IndexReader;
use crate::index::types::BucketSize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Buckets listed individually before the rest are summarized
const MAX_LISTED_BUCKETS: usize = 15;

/// Summary of an open index, printed by `simstring stats`
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub path: PathBuf,
    pub version: u32,
    pub ngram_length: usize,
    pub char_width: String,
    pub max_multiplicity: Option<u32>,
    pub string_count: u32,
    pub strings_bytes: u64,
    /// (size, members, distinct grams), ascending by size
    pub buckets: Vec<(BucketSize, u32, u32)>,
    pub disk_bytes: Option<u64>,
    pub created_at: u64,
}

impl IndexStats {
    pub fn collect(reader: &IndexReader) -> Self {
        let meta = reader.meta();
        Self {
            path: reader.path().to_path_buf(),
            version: meta.version,
            ngram_length: meta.config.ngram_length,
            char_width: meta.config.char_width.to_string(),
            max_multiplicity: meta.config.max_multiplicity,
            string_count: meta.string_count,
            strings_bytes: meta.strings_bytes,
            buckets: meta
                .buckets
                .iter()
                .map(|b| (b.size, b.members, b.grams))
                .collect(),
            disk_bytes: dir_size(reader.path()).ok(),
            created_at: meta.created_at,
        }
    }

    /// Total postings (distinct gram, bucket) pairs across all buckets
    pub fn gram_entries(&self) -> u64 {
        self.buckets.iter().map(|&(_, _, g)| g as u64).sum()
    }
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index Statistics")?;
        writeln!(f, "================")?;
        writeln!(f)?;
        writeln!(f, "Index location:   {}", self.path.display())?;
        writeln!(f, "Format version:   {}", self.version)?;
        writeln!(f, "N-gram length:    {}", self.ngram_length)?;
        writeln!(f, "Character type:   {}", self.char_width)?;
        if let Some(cap) = self.max_multiplicity {
            writeln!(f, "Multiplicity cap: {cap}")?;
        }
        writeln!(f, "String count:     {}", self.string_count)?;
        writeln!(f, "String bytes:     {}", format_size(self.strings_bytes))?;
        writeln!(f, "Bucket count:     {}", self.buckets.len())?;
        writeln!(f, "Gram entries:     {}", self.gram_entries())?;

        if !self.buckets.is_empty() {
            writeln!(f)?;
            writeln!(f, "Strings by n-gram count:")?;
            for &(size, members, _) in self.buckets.iter().take(MAX_LISTED_BUCKETS) {
                writeln!(f, "  {size:>6} {members}")?;
            }
            if self.buckets.len() > MAX_LISTED_BUCKETS {
                writeln!(f, "  ... and {} more", self.buckets.len() - MAX_LISTED_BUCKETS)?;
            }
        }

        if let Some(size) = self.disk_bytes {
            writeln!(f)?;
            writeln!(f, "Index size:       {}", format_size(size))?;
        }

        writeln!(f)?;
        write!(f, "Created:          {}", format_timestamp(self.created_at))
    }
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                size += entry.metadata()?.len();
            } else if path.is_dir() {
                size += dir_size(&path)?;
            }
        }
    }
    Ok(size)
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_timestamp(ts: u64) -> String {
    use std::time::{Duration, UNIX_EPOCH};
    let datetime = UNIX_EPOCH + Duration::from_secs(ts);
    format!("{:?}", datetime)
}
