use crate::error::{Error, IoContext, Result};
use crate::index::types::*;
use crate::ngram::NgramGenerator;
use crate::utils::{delta_encode, encode_postings, write_u16_le, write_u32_le, write_u64_le};
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// In-memory postings of one bucket, accumulated until finalize
#[derive(Default)]
struct BucketBuilder {
    members: Vec<StringId>,
    /// Gram -> ascending (string id, multiplicity)
    postings: BTreeMap<Box<[u8]>, Vec<(StringId, u32)>>,
}

/// Write handle for building an index.
///
/// Everything is staged in a sibling directory and moved into place by
/// [`IndexWriter::finalize`]; until then `path` never holds a readable index
/// built from this writer. Dropping an unfinished writer discards the staging
/// directory.
pub struct IndexWriter {
    path: PathBuf,
    staging: PathBuf,
    config: IndexConfig,
    generator: NgramGenerator,
    strings: Option<BufWriter<File>>,
    offsets: Vec<u64>,
    strings_bytes: u64,
    buckets: BTreeMap<BucketSize, BucketBuilder>,
    sealed: bool,
    /// Set when an insert hit an I/O error; the staged files may be torn
    failed: bool,
    committed: bool,
    started: Instant,
}

impl IndexWriter {
    /// Open `path` for a fresh build. An existing index at `path` is replaced
    /// on finalize; any other existing file or directory is refused.
    pub fn open_for_write(path: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let generator = NgramGenerator::from_config(&config)?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::config(format!("invalid index name: {}", path.display())))?;

        if path.exists() && !path.join(META_FILE).is_file() {
            return Err(Error::write(
                &path,
                io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not an index"),
            ));
        }

        let staging = path.with_file_name(format!(".{}.staging-{}", name, std::process::id()));
        if staging.exists() {
            warn!(path = %staging.display(), "removing stale staging directory");
            fs::remove_dir_all(&staging).write_ctx(&staging)?;
        }
        let buckets_dir = staging.join(BUCKETS_DIR);
        fs::create_dir_all(&buckets_dir).write_ctx(&buckets_dir)?;

        let strings_path = staging.join(STRINGS_FILE);
        let strings = BufWriter::new(File::create(&strings_path).write_ctx(&strings_path)?);

        debug!(
            path = %path.display(),
            ngram_length = config.ngram_length,
            char_width = %config.char_width,
            "opened index for writing"
        );

        Ok(Self {
            path,
            staging,
            config,
            generator,
            strings: Some(strings),
            offsets: Vec::new(),
            strings_bytes: 0,
            buckets: BTreeMap::new(),
            sealed: false,
            failed: false,
            committed: false,
            started: Instant::now(),
        })
    }

    /// Add a string; returns its id. Ids follow insertion order.
    pub fn insert(&mut self, s: &str) -> Result<StringId> {
        self.insert_bytes(s.as_bytes())
    }

    /// Add a string given as raw bytes. Narrow indexes store and gram the
    /// bytes verbatim; wide indexes store the lossily decoded text.
    ///
    /// A failed write leaves the writer unusable: every later insert and
    /// finalize returns [`Error::Aborted`].
    pub fn insert_bytes(&mut self, s: &[u8]) -> Result<StringId> {
        if self.sealed {
            return Err(Error::Sealed);
        }
        if self.failed {
            return Err(Error::Aborted);
        }
        let id = StringId::try_from(self.offsets.len())
            .map_err(|_| Error::config("index cannot hold more than u32::MAX strings"))?;

        let stored = match self.config.char_width {
            CharWidth::Narrow => Cow::Borrowed(s),
            CharWidth::Wide => match String::from_utf8_lossy(s) {
                Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
                Cow::Owned(text) => Cow::Owned(text.into_bytes()),
            },
        };
        let grams = self.generator.generate_bytes(&stored);

        let strings_path = self.staging.join(STRINGS_FILE);
        let Some(strings) = self.strings.as_mut() else {
            return Err(Error::Sealed);
        };
        if let Err(e) = strings.write_all(&stored) {
            self.failed = true;
            return Err(Error::write(&strings_path, e));
        }
        self.offsets.push(self.strings_bytes);
        self.strings_bytes += stored.len() as u64;

        let bucket = self.buckets.entry(grams.size()).or_default();
        bucket.members.push(id);
        for (gram, count) in grams.iter() {
            bucket
                .postings
                .entry(gram.into())
                .or_default()
                .push((id, count));
        }

        Ok(id)
    }

    /// Number of strings inserted so far
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Write every bucket, seal the index and move it to its final path.
    /// After this call, and after a failed call, the writer accepts nothing.
    pub fn finalize(&mut self) -> Result<IndexSummary> {
        if self.sealed {
            return Err(Error::Sealed);
        }
        if self.failed {
            return Err(Error::Aborted);
        }
        self.sealed = true;

        // Flush the string store
        let strings_path = self.staging.join(STRINGS_FILE);
        if let Some(strings) = self.strings.take() {
            let file = strings
                .into_inner()
                .map_err(|e| Error::write(&strings_path, e.into_error()))?;
            file.sync_all().write_ctx(&strings_path)?;
        }

        self.write_string_offsets()?;

        let buckets: Vec<(BucketSize, BucketBuilder)> =
            std::mem::take(&mut self.buckets).into_iter().collect();
        let buckets_dir = self.staging.join(BUCKETS_DIR);
        let gram_bytes = self.config.gram_bytes();

        // Buckets are independent files; encode and write them in parallel
        let written: Vec<(BucketMeta, Vec<StringId>)> = buckets
            .into_par_iter()
            .map(|(size, bucket)| write_bucket(&buckets_dir, size, bucket, gram_bytes))
            .collect::<Result<_>>()?;

        self.write_bucket_table(&written)?;

        let bucket_metas: Vec<BucketMeta> = written.into_iter().map(|(meta, _)| meta).collect();
        let bucket_count = bucket_metas.len();
        let string_count = self.offsets.len() as u32;
        self.write_meta(bucket_metas)?;

        self.commit()?;

        let summary = IndexSummary {
            string_count,
            bucket_count,
            elapsed: self.started.elapsed(),
        };
        info!(
            path = %self.path.display(),
            strings = summary.string_count,
            buckets = summary.bucket_count,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "index sealed"
        );
        Ok(summary)
    }

    /// Write strings.idx: count, then count + 1 offsets
    fn write_string_offsets(&self) -> Result<()> {
        let path = self.staging.join(STRING_OFFSETS_FILE);
        let result = (|| -> io::Result<()> {
            let mut file = BufWriter::new(File::create(&path)?);
            write_u32_le(&mut file, self.offsets.len() as u32)?;
            for &offset in &self.offsets {
                write_u64_le(&mut file, offset)?;
            }
            write_u64_le(&mut file, self.strings_bytes)?;
            file.into_inner().map_err(|e| e.into_error())?.sync_all()
        })();
        result.write_ctx(&path)
    }

    /// Write buckets.bin: per bucket, its size and delta-encoded members
    fn write_bucket_table(&self, buckets: &[(BucketMeta, Vec<StringId>)]) -> Result<()> {
        let path = self.staging.join(BUCKETS_FILE);
        let result = (|| -> io::Result<()> {
            let mut file = BufWriter::new(File::create(&path)?);
            write_u32_le(&mut file, buckets.len() as u32)?;

            let mut encoded = Vec::new();
            for (meta, members) in buckets {
                encoded.clear();
                delta_encode(members, &mut encoded);
                write_u32_le(&mut file, meta.size)?;
                write_u32_le(&mut file, members.len() as u32)?;
                write_u32_le(&mut file, encoded.len() as u32)?;
                file.write_all(&encoded)?;
            }
            file.into_inner().map_err(|e| e.into_error())?.sync_all()
        })();
        result.write_ctx(&path)
    }

    /// Write meta.json; its presence is what makes the directory an index
    fn write_meta(&self, buckets: Vec<BucketMeta>) -> Result<()> {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let meta = IndexMeta {
            version: FORMAT_VERSION,
            config: self.config,
            string_count: self.offsets.len() as u32,
            strings_bytes: self.strings_bytes,
            buckets,
            created_at,
        };

        let path = self.staging.join(META_FILE);
        let file = File::create(&path).write_ctx(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &meta)
            .map_err(|e| Error::write(&path, e.into()))?;
        writer
            .into_inner()
            .map_err(|e| Error::write(&path, e.into_error()))?
            .sync_all()
            .write_ctx(&path)
    }

    /// Swap the staging directory into place
    fn commit(&mut self) -> Result<()> {
        let retired = self.staging.with_extension("old");
        let replacing = self.path.exists();
        if replacing {
            if retired.exists() {
                fs::remove_dir_all(&retired).write_ctx(&retired)?;
            }
            fs::rename(&self.path, &retired).write_ctx(&self.path)?;
        }

        if let Err(e) = fs::rename(&self.staging, &self.path) {
            if replacing {
                // Put the previous index back
                let _ = fs::rename(&retired, &self.path);
            }
            return Err(Error::write(&self.path, e));
        }
        self.committed = true;

        if replacing {
            if let Err(e) = fs::remove_dir_all(&retired) {
                warn!(path = %retired.display(), error = %e, "failed to remove replaced index");
            }
        }
        Ok(())
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            if let Err(e) = fs::remove_dir_all(&self.staging) {
                warn!(path = %self.staging.display(), error = %e, "failed to remove staging directory");
            }
        }
    }
}

/// Write the dictionary and postings files of one bucket
fn write_bucket(
    dir: &Path,
    size: BucketSize,
    bucket: BucketBuilder,
    gram_bytes: usize,
) -> Result<(BucketMeta, Vec<StringId>)> {
    let (dict_name, postings_name) = bucket_file_names(size);
    let dict_path = dir.join(dict_name);
    let postings_path = dir.join(postings_name);

    let mut dict_file = BufWriter::new(File::create(&dict_path).write_ctx(&dict_path)?);
    let mut postings_file = BufWriter::new(File::create(&postings_path).write_ctx(&postings_path)?);

    (|| -> io::Result<()> {
        write_u32_le(&mut dict_file, bucket.postings.len() as u32)?;
        write_u16_le(&mut dict_file, gram_bytes as u16)
    })()
    .write_ctx(&dict_path)?;

    let mut postings_offset: u64 = 0;
    let mut encoded = Vec::new();

    // BTreeMap iteration keeps the dictionary sorted by gram
    for (gram, postings) in &bucket.postings {
        encoded.clear();
        encode_postings(postings, &mut encoded);

        (|| -> io::Result<()> {
            dict_file.write_all(gram)?;
            write_u64_le(&mut dict_file, postings_offset)?;
            write_u32_le(&mut dict_file, encoded.len() as u32)?;
            write_u32_le(&mut dict_file, postings.len() as u32)
        })()
        .write_ctx(&dict_path)?;

        postings_file.write_all(&encoded).write_ctx(&postings_path)?;
        postings_offset += encoded.len() as u64;
    }

    dict_file
        .into_inner()
        .map_err(|e| Error::write(&dict_path, e.into_error()))?
        .sync_all()
        .write_ctx(&dict_path)?;
    postings_file
        .into_inner()
        .map_err(|e| Error::write(&postings_path, e.into_error()))?
        .sync_all()
        .write_ctx(&postings_path)?;

    debug!(
        size,
        members = bucket.members.len(),
        grams = bucket.postings.len(),
        "bucket flushed"
    );

    let meta = BucketMeta {
        size,
        members: bucket.members.len() as u32,
        grams: bucket.postings.len() as u32,
        postings_bytes: postings_offset,
    };
    Ok((meta, bucket.members))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open_for_write(dir.path().join("db"), IndexConfig::default()).unwrap();
        assert_eq!(writer.insert("alpha").unwrap(), 0);
        assert_eq!(writer.insert("beta").unwrap(), 1);
        assert_eq!(writer.insert("alpha").unwrap(), 2);
        assert_eq!(writer.len(), 3);
    }

    #[test]
    fn test_sealed_after_finalize() {
        let dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open_for_write(dir.path().join("db"), IndexConfig::default()).unwrap();
        writer.insert("alpha").unwrap();
        let summary = writer.finalize().unwrap();
        assert_eq!(summary.string_count, 1);
        assert_eq!(summary.bucket_count, 1);

        assert!(matches!(writer.insert("beta"), Err(Error::Sealed)));
        assert!(matches!(writer.finalize(), Err(Error::Sealed)));
    }

    #[test]
    fn test_finalize_writes_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let mut writer = IndexWriter::open_for_write(&path, IndexConfig::new(2, CharWidth::Narrow)).unwrap();
        writer.insert("cat").unwrap();
        writer.insert("cats").unwrap();
        writer.finalize().unwrap();

        assert!(path.join(META_FILE).is_file());
        assert!(path.join(STRINGS_FILE).is_file());
        assert!(path.join(STRING_OFFSETS_FILE).is_file());
        assert!(path.join(BUCKETS_FILE).is_file());
        let (dict, postings) = bucket_file_names(4);
        assert!(path.join(BUCKETS_DIR).join(dict).is_file());
        assert!(path.join(BUCKETS_DIR).join(postings).is_file());
        assert_eq!(fs::read(path.join(STRINGS_FILE)).unwrap(), b"catcats");
    }

    #[test]
    fn test_dropped_writer_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        {
            let mut writer = IndexWriter::open_for_write(&path, IndexConfig::default()).unwrap();
            writer.insert("partial").unwrap();
        }
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_refuses_non_index_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep.txt"), b"important").unwrap();

        let result = IndexWriter::open_for_write(&path, IndexConfig::default());
        assert!(matches!(result, Err(Error::StorageWrite { .. })));
        assert!(path.join("keep.txt").exists());
    }

    #[test]
    fn test_invalid_ngram_length() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(0, CharWidth::Narrow);
        let result = IndexWriter::open_for_write(dir.path().join("db"), config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rebuild_replaces_existing_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        for word in ["first", "second"] {
            let mut writer = IndexWriter::open_for_write(&path, IndexConfig::default()).unwrap();
            writer.insert(word).unwrap();
            writer.finalize().unwrap();
        }
        assert_eq!(fs::read(path.join(STRINGS_FILE)).unwrap(), b"second");
        // Only the index itself remains next to it
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_narrow_stores_raw_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let mut writer = IndexWriter::open_for_write(&path, IndexConfig::new(2, CharWidth::Narrow)).unwrap();
        writer.insert_bytes(b"\xe9t\xe9").unwrap();
        writer.insert_bytes(b"\xe8t\xe8").unwrap();
        writer.finalize().unwrap();
        assert_eq!(fs::read(path.join(STRINGS_FILE)).unwrap(), b"\xe9t\xe9\xe8t\xe8");
    }

    #[test]
    fn test_wide_stores_decoded_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let mut writer = IndexWriter::open_for_write(&path, IndexConfig::new(2, CharWidth::Wide)).unwrap();
        writer.insert_bytes(b"a\xff").unwrap();
        writer.finalize().unwrap();
        assert_eq!(fs::read(path.join(STRINGS_FILE)).unwrap(), "a\u{fffd}".as_bytes());
    }

    #[test]
    fn test_failed_write_aborts_and_keeps_previous_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let mut writer = IndexWriter::open_for_write(&path, IndexConfig::default()).unwrap();
        writer.insert("original").unwrap();
        writer.finalize().unwrap();

        let mut writer = IndexWriter::open_for_write(&path, IndexConfig::default()).unwrap();
        writer.insert("staged").unwrap();
        // Swap the string store for a read-only handle so the next write fails
        let readonly = dir.path().join("readonly");
        fs::write(&readonly, b"").unwrap();
        writer.strings = Some(BufWriter::new(File::open(&readonly).unwrap()));

        // Larger than the buffer, so it goes straight to the file
        let long = "x".repeat(64 * 1024);
        assert!(matches!(writer.insert(&long), Err(Error::StorageWrite { .. })));
        assert!(matches!(writer.insert("after"), Err(Error::Aborted)));
        assert!(matches!(writer.finalize(), Err(Error::Aborted)));
        drop(writer);

        assert_eq!(fs::read(path.join(STRINGS_FILE)).unwrap(), b"original");
        let reader = crate::index::reader::IndexReader::open(&path).unwrap();
        assert_eq!(reader.len(), 1);
    }
}
