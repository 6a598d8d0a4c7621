pub mod build;
pub mod reader;
pub mod stats;
pub mod types;
pub mod writer;

pub use build::{build_from_reader, strip_line_ending};
pub use reader::IndexReader;
pub use stats::IndexStats;
pub use types::*;
pub use writer::IndexWriter;
