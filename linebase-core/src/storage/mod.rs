// storage/mod.rs
// Collection files: one JSON record per line.
//
// Reads stream through `RecordReader`; every mutation other than append goes
// through `rewrite`, which swaps a fully written temporary file in with a
// single rename.

mod reader;
mod rewrite;
mod scan;

pub use reader::{RawRecord, RecordReader};
pub use rewrite::{rewrite, RewriteAction, RewriteSummary};
pub use scan::{read_all, scan, ScanSummary};
