//! N-gram generation.
//!
//! A string is padded with `n - 1` marker units on both sides and cut into
//! every window of `n` code units. Windows are kept as a multiset: a gram
//! occurring twice counts twice, which is what the overlap in
//! [`crate::measure`] is computed over.
//!
//! ```
//! use simstring::ngram::NgramGenerator;
//! use simstring::CharWidth;
//!
//! let generator = NgramGenerator::new(2, CharWidth::Narrow).unwrap();
//! let grams = generator.generate("cat");
//! // "\x01c", "ca", "at", "t\x01"
//! assert_eq!(grams.size(), 4);
//! ```

use crate::error::Result;
use crate::index::types::{CharWidth, IndexConfig};
use std::cmp::Ordering;

/// Marker unit used to pad both ends of a string
pub const PAD_MARK: u32 = 0x01;

/// Deterministic string to n-gram multiset mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NgramGenerator {
    n: usize,
    width: CharWidth,
    max_multiplicity: Option<u32>,
}

impl NgramGenerator {
    pub fn new(n: usize, width: CharWidth) -> Result<Self> {
        Self::from_config(&IndexConfig::new(n, width))
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            n: config.ngram_length,
            width: config.char_width,
            max_multiplicity: config.max_multiplicity,
        })
    }

    pub fn ngram_length(&self) -> usize {
        self.n
    }

    pub fn char_width(&self) -> CharWidth {
        self.width
    }

    /// Width in bytes of one encoded gram
    pub fn gram_bytes(&self) -> usize {
        self.n * self.width.unit_bytes()
    }

    /// Generate the n-gram multiset of `s`. Never empty.
    pub fn generate(&self, s: &str) -> NgramMultiset {
        self.generate_bytes(s.as_bytes())
    }

    /// Generate the n-gram multiset of raw input. Narrow grams are cut from
    /// the bytes as given; wide grams from the lossily decoded scalars.
    pub fn generate_bytes(&self, s: &[u8]) -> NgramMultiset {
        let unit = self.width.unit_bytes();
        let padded = self.padded_bytes(s);
        let width = self.gram_bytes();
        let windows = padded.len() / unit - self.n + 1;

        let mut grams: Vec<&[u8]> = (0..windows)
            .map(|i| &padded[i * unit..i * unit + width])
            .collect();
        grams.sort_unstable();

        let mut bytes = Vec::with_capacity(grams.len() * width);
        let mut counts: Vec<u32> = Vec::with_capacity(grams.len());
        let mut prev: Option<&[u8]> = None;
        for gram in grams {
            if prev == Some(gram) {
                if let Some(last) = counts.last_mut() {
                    *last += 1;
                }
            } else {
                bytes.extend_from_slice(gram);
                counts.push(1);
                prev = Some(gram);
            }
        }

        if let Some(cap) = self.max_multiplicity {
            for count in &mut counts {
                *count = (*count).min(cap);
            }
        }

        NgramMultiset::from_parts(width, bytes, counts)
    }

    /// Encode the padded code units of `s` as bytes
    fn padded_bytes(&self, s: &[u8]) -> Vec<u8> {
        let mut units: Vec<u32> = Vec::with_capacity(s.len() + 2 * (self.n - 1));
        units.extend(std::iter::repeat_n(PAD_MARK, self.n - 1));
        match self.width {
            CharWidth::Narrow => units.extend(s.iter().copied().map(u32::from)),
            CharWidth::Wide => units.extend(String::from_utf8_lossy(s).chars().map(u32::from)),
        }
        units.extend(std::iter::repeat_n(PAD_MARK, self.n - 1));
        if units.len() < self.n {
            units.resize(self.n, PAD_MARK);
        }

        match self.width {
            CharWidth::Narrow => units.into_iter().map(|u| u as u8).collect(),
            CharWidth::Wide => units.into_iter().flat_map(u32::to_le_bytes).collect(),
        }
    }
}

/// Sorted multiset of fixed-width grams with their multiplicities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgramMultiset {
    width: usize,
    bytes: Vec<u8>,
    counts: Vec<u32>,
    size: u32,
}

impl NgramMultiset {
    fn from_parts(width: usize, bytes: Vec<u8>, counts: Vec<u32>) -> Self {
        let size = counts.iter().sum();
        Self {
            width,
            bytes,
            counts,
            size,
        }
    }

    /// Total number of grams, counting multiplicity
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of distinct grams
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Width in bytes of each gram
    pub fn gram_width(&self) -> usize {
        self.width
    }

    /// Iterate `(gram, multiplicity)` in ascending gram order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u32)> + '_ {
        self.bytes
            .chunks_exact(self.width.max(1))
            .zip(self.counts.iter().copied())
    }

    /// Multiplicity of `gram`, zero when absent
    pub fn count(&self, gram: &[u8]) -> u32 {
        let mut lo = 0;
        let mut hi = self.counts.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.gram_at(mid).cmp(gram) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return self.counts[mid],
            }
        }
        0
    }

    /// Sum over shared grams of the smaller multiplicity
    pub fn overlap(&self, other: &NgramMultiset) -> u32 {
        let mut a = self.iter().peekable();
        let mut b = other.iter().peekable();
        let mut total = 0;
        while let (Some(&(ga, ca)), Some(&(gb, cb))) = (a.peek(), b.peek()) {
            match ga.cmp(gb) {
                Ordering::Less => {
                    a.next();
                }
                Ordering::Greater => {
                    b.next();
                }
                Ordering::Equal => {
                    total += ca.min(cb);
                    a.next();
                    b.next();
                }
            }
        }
        total
    }

    fn gram_at(&self, i: usize) -> &[u8] {
        &self.bytes[i * self.width..(i + 1) * self.width]
    }
}
