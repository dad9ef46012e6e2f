// storage/scan.rs
// Streaming scan: decode, filter, visit, stop on demand

use std::ops::ControlFlow;
use std::path::Path;

use super::reader::RecordReader;
use crate::document::Document;
use crate::error::Result;
use crate::log_trace;
use crate::query::Filter;

/// What a scan looked at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Physical lines consumed, blank lines included
    pub lines_read: usize,
    pub records_scanned: usize,
    pub matched: usize,
    /// The visitor broke out before end of file
    pub stopped_early: bool,
}

/// Visit every record matching `filter`, in file order.
///
/// Only one decoded record is alive at a time. The visitor returns
/// `ControlFlow::Break(())` to stop reading. A malformed line aborts the whole
/// scan with its line number.
pub fn scan<F>(path: &Path, filter: &Filter, mut visit: F) -> Result<ScanSummary>
where
    F: FnMut(Document) -> ControlFlow<()>,
{
    let mut reader = RecordReader::open(path)?;
    let mut summary = ScanSummary::default();

    while let Some(record) = reader.next_record()? {
        summary.records_scanned += 1;
        if !filter.matches(&record.document) {
            continue;
        }
        summary.matched += 1;
        if visit(record.document).is_break() {
            summary.stopped_early = true;
            break;
        }
    }
    summary.lines_read = reader.lines_read();

    log_trace!(
        "scan {}: {} lines, {} records, {} matched{}",
        path.display(),
        summary.lines_read,
        summary.records_scanned,
        summary.matched,
        if summary.stopped_early { " (stopped early)" } else { "" }
    );
    Ok(summary)
}

/// Load the whole collection into memory
pub fn read_all(path: &Path) -> Result<Vec<Document>> {
    RecordReader::open(path)?.collect()
}
