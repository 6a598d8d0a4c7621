use crate::error::{Error, IoContext, Result};
use crate::index::types::*;
use crate::ngram::NgramGenerator;
use crate::utils::{PostingIter, decode_postings, delta_decode, read_u16_le, read_u32_le, read_u64_le};
use memmap2::Mmap;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Dictionary entry locating one gram's postings
#[derive(Debug, Clone, Copy)]
struct DictEntry {
    offset: u64,
    length: u32,
    postings: u32,
}

/// Sorted gram dictionary of a bucket; grams are fixed-width and stored contiguously
struct GramDict {
    width: usize,
    grams: Vec<u8>,
    entries: Vec<DictEntry>,
}

impl GramDict {
    fn gram(&self, i: usize) -> &[u8] {
        &self.grams[i * self.width..(i + 1) * self.width]
    }

    fn lookup(&self, gram: &[u8]) -> Option<&DictEntry> {
        let mut lo = 0;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.gram(mid).cmp(gram) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(&self.entries[mid]),
            }
        }
        None
    }
}

/// Encoded posting list of one gram inside one bucket
#[derive(Debug, Clone, Copy)]
pub struct PostingList<'a> {
    bytes: &'a [u8],
    len: u32,
}

impl<'a> PostingList<'a> {
    const EMPTY: PostingList<'static> = PostingList { bytes: &[], len: 0 };

    /// Number of strings in the list
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `(string id, multiplicity)` in ascending id order
    pub fn iter(&self) -> PostingIter<'a> {
        PostingIter::new(self.bytes)
    }

    pub fn decode(&self) -> Vec<(StringId, u32)> {
        decode_postings(self.bytes)
    }
}

/// Read side of one bucket: the strings whose multiset has `size` grams
pub struct BucketReader {
    size: BucketSize,
    members: Vec<StringId>,
    dict: GramDict,
    postings: Option<Mmap>,
}

impl BucketReader {
    fn open(dir: &Path, size: BucketSize, members: Vec<StringId>, meta: &BucketMeta, gram_bytes: usize) -> Result<Self> {
        let (dict_name, postings_name) = bucket_file_names(size);
        let dict_path = dir.join(dict_name);
        let postings_path = dir.join(postings_name);

        let dict = read_gram_dict(&dict_path, gram_bytes)?;
        if dict.entries.len() != meta.grams as usize {
            return Err(Error::corrupt(&dict_path, "gram count disagrees with meta.json"));
        }

        let postings = map_file(&postings_path)?;
        let postings_len = postings.as_ref().map_or(0, |m| m.len()) as u64;
        if postings_len != meta.postings_bytes {
            return Err(Error::corrupt(&postings_path, "postings size disagrees with meta.json"));
        }
        if dict.entries.iter().any(|e| e.offset + e.length as u64 > postings_len) {
            return Err(Error::corrupt(&dict_path, "entry points past the postings file"));
        }

        debug!(size, members = members.len(), grams = dict.entries.len(), "bucket loaded");

        Ok(Self {
            size,
            members,
            dict,
            postings,
        })
    }

    /// Gram count shared by every member
    pub fn size(&self) -> BucketSize {
        self.size
    }

    /// Member ids in insertion order
    pub fn members(&self) -> &[StringId] {
        &self.members
    }

    /// Number of distinct grams with postings in this bucket
    pub fn gram_count(&self) -> usize {
        self.dict.entries.len()
    }

    /// Postings of `gram`; empty when no member contains it
    pub fn postings(&self, gram: &[u8]) -> PostingList<'_> {
        let (Some(entry), Some(mmap)) = (self.dict.lookup(gram), self.postings.as_ref()) else {
            return PostingList::EMPTY;
        };
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        PostingList {
            bytes: &mmap[start..end],
            len: entry.postings,
        }
    }
}

/// Read handle of a sealed index. Immutable and shareable across threads.
pub struct IndexReader {
    path: PathBuf,
    meta: IndexMeta,
    generator: NgramGenerator,
    strings: Option<Mmap>,
    offsets: Vec<u64>,
    /// Sorted by ascending size
    buckets: Vec<BucketReader>,
}

impl IndexReader {
    /// Open a sealed index, taking its width from the stored metadata
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let meta_path = path.join(META_FILE);
        let meta_file = File::open(&meta_path).read_ctx(&meta_path)?;
        let meta: IndexMeta = serde_json::from_reader(BufReader::new(meta_file))
            .map_err(|e| Error::corrupt(&meta_path, e.to_string()))?;

        if meta.version != FORMAT_VERSION {
            return Err(Error::corrupt(
                &meta_path,
                format!("unsupported format version {}", meta.version),
            ));
        }
        let generator = NgramGenerator::from_config(&meta.config)
            .map_err(|e| Error::corrupt(&meta_path, e.to_string()))?;
        if meta.buckets.windows(2).any(|w| w[0].size >= w[1].size) {
            return Err(Error::corrupt(&meta_path, "bucket sizes are not ascending"));
        }

        let (strings, offsets) = rayon::join(
            || read_strings(&path, &meta),
            || read_string_offsets(&path, &meta),
        );
        let strings = strings?;
        let offsets = offsets?;
        if meta.config.char_width == CharWidth::Wide {
            check_string_boundaries(&path, strings.as_deref().unwrap_or(&[]), &offsets)?;
        }

        let members = read_bucket_table(&path, &meta)?;
        let buckets_dir = path.join(BUCKETS_DIR);
        let gram_bytes = meta.config.gram_bytes();

        // Buckets are independent; load them in parallel
        let buckets: Vec<BucketReader> = meta
            .buckets
            .par_iter()
            .zip(members.into_par_iter())
            .map(|(bucket_meta, members)| {
                BucketReader::open(&buckets_dir, bucket_meta.size, members, bucket_meta, gram_bytes)
            })
            .collect::<Result<_>>()?;

        info!(
            path = %path.display(),
            strings = meta.string_count,
            buckets = buckets.len(),
            "index opened"
        );

        Ok(Self {
            path,
            meta,
            generator,
            strings,
            offsets,
            buckets,
        })
    }

    /// Open a sealed index that must have been built with `width`
    pub fn open_with_width(path: impl AsRef<Path>, width: CharWidth) -> Result<Self> {
        let reader = Self::open(path)?;
        let stored = reader.meta.config.char_width;
        if stored != width {
            return Err(Error::config(format!(
                "index {} was built with {} characters, opened as {}",
                reader.path.display(),
                stored,
                width
            )));
        }
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn config(&self) -> &IndexConfig {
        &self.meta.config
    }

    /// Generator configured exactly as at build time
    pub fn generator(&self) -> &NgramGenerator {
        &self.generator
    }

    /// Number of stored strings, duplicates included
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stored bytes of string `id`
    pub fn string_bytes(&self, id: StringId) -> Option<&[u8]> {
        let id = id as usize;
        let start = *self.offsets.get(id)? as usize;
        let end = *self.offsets.get(id + 1)? as usize;
        let blob = self.strings.as_deref().unwrap_or(&[]);
        blob.get(start..end)
    }

    /// The string inserted with `id`; `None` if out of range or, in a narrow
    /// index, if its bytes are not UTF-8
    pub fn string(&self, id: StringId) -> Option<&str> {
        std::str::from_utf8(self.string_bytes(id)?).ok()
    }

    /// All buckets, ascending by size
    pub fn buckets(&self) -> &[BucketReader] {
        &self.buckets
    }

    pub fn bucket(&self, size: BucketSize) -> Option<&BucketReader> {
        self.buckets
            .binary_search_by_key(&size, |b| b.size)
            .ok()
            .map(|i| &self.buckets[i])
    }

    /// Buckets whose size lies within `[min, max]`, ascending
    pub fn buckets_between(&self, min: BucketSize, max: BucketSize) -> &[BucketReader] {
        let lo = self.buckets.partition_point(|b| b.size < min);
        let hi = self.buckets.partition_point(|b| b.size <= max);
        &self.buckets[lo..hi.max(lo)]
    }
}

/// Map a file read-only; empty files map to `None`
fn map_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path).read_ctx(path)?;
    let len = file.metadata().read_ctx(path)?.len();
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: index files are never modified after they are sealed
    let mmap = unsafe { Mmap::map(&file) }.read_ctx(path)?;
    Ok(Some(mmap))
}

fn read_strings(index_path: &Path, meta: &IndexMeta) -> Result<Option<Mmap>> {
    let path = index_path.join(STRINGS_FILE);
    let strings = map_file(&path)?;
    let len = strings.as_ref().map_or(0, |m| m.len()) as u64;
    if len != meta.strings_bytes {
        return Err(Error::corrupt(&path, "string store size disagrees with meta.json"));
    }
    Ok(strings)
}

/// Read strings.idx into `count + 1` offsets
fn read_string_offsets(index_path: &Path, meta: &IndexMeta) -> Result<Vec<u64>> {
    let path = index_path.join(STRING_OFFSETS_FILE);
    let mut file = BufReader::new(File::open(&path).read_ctx(&path)?);

    let count = read_u32_le(&mut file).read_ctx(&path)?;
    if count != meta.string_count {
        return Err(Error::corrupt(&path, "string count disagrees with meta.json"));
    }

    let mut offsets = Vec::with_capacity(count as usize + 1);
    for _ in 0..=count {
        offsets.push(read_u64_le(&mut file).read_ctx(&path)?);
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) || offsets.last() != Some(&meta.strings_bytes) {
        return Err(Error::corrupt(&path, "string offsets are inconsistent"));
    }
    Ok(offsets)
}

/// A wide store must be UTF-8 with every offset on a character boundary
fn check_string_boundaries(index_path: &Path, blob: &[u8], offsets: &[u64]) -> Result<()> {
    let path = index_path.join(STRINGS_FILE);
    let text = std::str::from_utf8(blob).map_err(|e| Error::corrupt(&path, e.to_string()))?;
    if offsets.iter().any(|&o| !text.is_char_boundary(o as usize)) {
        return Err(Error::corrupt(&path, "string offset splits a character"));
    }
    Ok(())
}

/// Read buckets.bin; yields the member list of each bucket in meta order
fn read_bucket_table(index_path: &Path, meta: &IndexMeta) -> Result<Vec<Vec<StringId>>> {
    let path = index_path.join(BUCKETS_FILE);
    let mut file = BufReader::new(File::open(&path).read_ctx(&path)?);

    let count = read_u32_le(&mut file).read_ctx(&path)? as usize;
    if count != meta.buckets.len() {
        return Err(Error::corrupt(&path, "bucket count disagrees with meta.json"));
    }

    let mut tables = Vec::with_capacity(count);
    let mut total = 0u64;
    for bucket in &meta.buckets {
        let size = read_u32_le(&mut file).read_ctx(&path)?;
        let member_count = read_u32_le(&mut file).read_ctx(&path)?;
        let encoded_len = read_u32_le(&mut file).read_ctx(&path)? as usize;

        let mut encoded = vec![0u8; encoded_len];
        file.read_exact(&mut encoded).read_ctx(&path)?;
        let members = delta_decode(&encoded);

        if size != bucket.size || member_count != bucket.members || members.len() != member_count as usize {
            return Err(Error::corrupt(&path, format!("bucket {} disagrees with meta.json", bucket.size)));
        }
        if members.iter().any(|&id| id >= meta.string_count) {
            return Err(Error::corrupt(&path, format!("bucket {} references a missing string", size)));
        }
        total += members.len() as u64;
        tables.push(members);
    }

    if total != meta.string_count as u64 {
        return Err(Error::corrupt(&path, "buckets do not cover every string"));
    }
    Ok(tables)
}

/// Read a bucket dictionary
fn read_gram_dict(path: &Path, gram_bytes: usize) -> Result<GramDict> {
    let mut file = BufReader::new(File::open(path).read_ctx(path)?);

    let count = read_u32_le(&mut file).read_ctx(path)? as usize;
    let width = read_u16_le(&mut file).read_ctx(path)? as usize;
    if width != gram_bytes {
        return Err(Error::corrupt(path, format!("gram width {width}, expected {gram_bytes}")));
    }

    let mut grams = vec![0u8; count * width];
    let mut entries = Vec::with_capacity(count);

    for i in 0..count {
        file.read_exact(&mut grams[i * width..(i + 1) * width]).read_ctx(path)?;
        let offset = read_u64_le(&mut file).read_ctx(path)?;
        let length = read_u32_le(&mut file).read_ctx(path)?;
        let postings = read_u32_le(&mut file).read_ctx(path)?;
        entries.push(DictEntry {
            offset,
            length,
            postings,
        });
    }

    let dict = GramDict {
        width,
        grams,
        entries,
    };
    // Lookups binary-search the grams
    if (1..count).any(|i| dict.gram(i - 1) >= dict.gram(i)) {
        return Err(Error::corrupt(path, "grams are not sorted"));
    }
    Ok(dict)
}
