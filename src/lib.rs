//! # simstring - approximate string retrieval
//!
//! Builds a persistent index over a collection of strings and answers
//! "which stored strings are at least τ-similar to this query?" under the
//! exact, dice, cosine, jaccard and overlap measures on character n-gram
//! multisets.
//!
//! ## Architecture
//!
//! - [`ngram`] - padded n-gram multisets over bytes or Unicode scalars
//! - [`measure`] - similarity scores and the size/overlap bounds they imply
//! - [`index`] - the size-bucketed inverted index: writer, reader, stats
//! - [`query`] - planning and lazy execution of similarity queries
//! - [`utils`] - codecs, user config and progress reporting
//!
//! ## Quick Start
//!
//! ```no_run
//! use simstring::{IndexConfig, IndexReader, IndexWriter, Measure};
//!
//! let mut writer = IndexWriter::open_for_write("names.db", IndexConfig::default())?;
//! for name in ["Barack Obama", "Barack H. Obama", "Michelle Obama"] {
//!     writer.insert(name)?;
//! }
//! writer.finalize()?;
//!
//! let reader = IndexReader::open("names.db")?;
//! for m in reader.retrieve("Barack Obama", Measure::Cosine, 0.6)? {
//!     println!("{} ({:.3})", m.text(), m.score);
//! }
//! # Ok::<(), simstring::Error>(())
//! ```
//!
//! Strings are grouped into buckets by n-gram count. A query scans only the
//! buckets whose size can reach the threshold, and within each bucket
//! demands a minimum overlap derived from the measure, so most of the index
//! is never touched.

pub mod error;
pub mod index;
pub mod measure;
pub mod ngram;
pub mod query;
pub mod utils;

pub use error::{Error, Result};
pub use index::{CharWidth, IndexConfig, IndexReader, IndexWriter};
pub use measure::Measure;
pub use ngram::{NgramGenerator, NgramMultiset};
pub use query::{Match, Matches, Query, retrieve};
