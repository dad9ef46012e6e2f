// storage/rewrite.rs
// Read -> transform -> temp file in the same directory -> rename

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::reader::RecordReader;
use crate::config::WriteOptions;
use crate::document::Document;
use crate::error::{io_at, LineBaseError, Result};
use crate::log_debug;

/// What to do with one record during a rewrite
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteAction {
    /// Copy the original line byte for byte
    Keep,
    /// Write this record instead
    Replace(Document),
    /// Leave the record out
    Drop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub records_read: usize,
    pub kept: usize,
    pub replaced: usize,
    pub dropped: usize,
    pub size_before: u64,
    pub size_after: u64,
    /// False when the transform kept everything and the file was left alone
    pub committed: bool,
}

impl RewriteSummary {
    pub fn changed(&self) -> bool {
        self.replaced > 0 || self.dropped > 0
    }
}

/// Rewrite a collection file through `transform`.
///
/// The output goes to a uniquely named temporary file next to `path`, which
/// is renamed over the original only after every record has been written.
/// Any error before that point (I/O, a malformed line, an error returned by
/// `transform`) leaves the original untouched; the temporary file is removed
/// when it is dropped.
///
/// If every record is kept, nothing is renamed and the file keeps its exact
/// bytes, blank lines included.
pub fn rewrite<F>(path: &Path, options: &WriteOptions, mut transform: F) -> Result<RewriteSummary>
where
    F: FnMut(&Document) -> Result<RewriteAction>,
{
    let source = File::open(path).map_err(io_at(path))?;
    let metadata = source.metadata().map_err(io_at(path))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let base_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", base_name))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_at(dir))?;

    let mut summary = RewriteSummary {
        size_before: metadata.len(),
        ..RewriteSummary::default()
    };

    let mut reader = RecordReader::new(BufReader::new(source));
    let mut writer = BufWriter::new(temp);

    while let Some(record) = reader.next_record()? {
        summary.records_read += 1;
        match transform(&record.document)? {
            RewriteAction::Keep => {
                summary.kept += 1;
                writer.write_all(record.line.as_bytes())?;
            }
            RewriteAction::Replace(doc) => {
                summary.replaced += 1;
                writer.write_all(doc.encode()?.as_bytes())?;
            }
            RewriteAction::Drop => {
                summary.dropped += 1;
                continue;
            }
        }
        writer.write_all(b"\n")?;
    }

    if !summary.changed() {
        summary.size_after = summary.size_before;
        log_debug!(
            "rewrite {}: {} records, nothing changed",
            path.display(),
            summary.records_read
        );
        return Ok(summary);
    }

    let temp = writer
        .into_inner()
        .map_err(|e| LineBaseError::Io(e.into_error()))?;
    let temp_path = temp.path().to_path_buf();

    fs::set_permissions(&temp_path, metadata.permissions()).map_err(io_at(&temp_path))?;
    if options.sync_on_rewrite {
        temp.as_file().sync_all().map_err(io_at(&temp_path))?;
    }
    summary.size_after = temp.as_file().metadata().map_err(io_at(&temp_path))?.len();

    temp.persist(path)
        .map_err(|e| LineBaseError::from_io(path, e.error))?;
    summary.committed = true;

    log_debug!(
        "rewrite {}: kept={} replaced={} dropped={} ({} -> {} bytes)",
        path.display(),
        summary.kept,
        summary.replaced,
        summary.dropped,
        summary.size_before,
        summary.size_after
    );
    Ok(summary)
}
