use crate::error::{IoContext, Result};
use crate::index::types::{IndexConfig, IndexSummary};
use crate::index::writer::IndexWriter;
use crate::utils::REPORT_INTERVAL;
use std::io::BufRead;
use std::path::Path;
use tracing::debug;

/// Build an index at `path` from newline-separated input.
///
/// Each line is one string; `\n` and `\r\n` terminators are stripped and the
/// remaining bytes go to [`IndexWriter::insert_bytes`] as they are.
/// `on_progress` is called with the running count every [`REPORT_INTERVAL`]
/// strings, and once more with the final count.
pub fn build_from_reader<R, F>(
    path: &Path,
    config: IndexConfig,
    mut input: R,
    mut on_progress: F,
) -> Result<IndexSummary>
where
    R: BufRead,
    F: FnMut(u64),
{
    let mut writer = IndexWriter::open_for_write(path, config)?;
    let mut line = Vec::new();
    let mut count: u64 = 0;

    loop {
        line.clear();
        let read = input
            .read_until(b'\n', &mut line)
            .read_ctx(Path::new("<input>"))?;
        if read == 0 {
            break;
        }
        writer.insert_bytes(strip_line_ending(&line))?;

        count += 1;
        if count % REPORT_INTERVAL == 0 {
            on_progress(count);
        }
    }
    if count % REPORT_INTERVAL != 0 {
        on_progress(count);
    }

    debug!(path = %path.display(), strings = count, "input consumed");
    writer.finalize()
}

/// Drop one trailing `\n` or `\r\n`
pub fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
