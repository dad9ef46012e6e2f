// linebase-core/src/collection.rs
//! Collection handle: one file, one JSON record per line.
//!
//! Reads stream through the file and hold one record at a time (except
//! `aggregate`, which loads everything). Inserts append. Every other mutation
//! is a rewrite into a temporary file followed by an atomic rename.
//!
//! A `Collection` holds no open file and no lock. Handles on different files
//! can be used from different threads freely; concurrent writers on the *same*
//! file are not coordinated and the last rename wins.

mod schema;
mod update;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use serde_json::Value;

use crate::aggregation::Pipeline;
use crate::config::WriteOptions;
use crate::document::Document;
use crate::error::{io_at, LineBaseError, Result};
use crate::find_options::{page_offset, Page, Projection};
use crate::query::Filter;
use crate::storage::{self, RewriteAction, RewriteSummary, ScanSummary};
use crate::value_utils::canonical_json_string;
use crate::{log_debug, log_trace};

pub use schema::Schema;
use update::UpdateSpec;

/// Outcome of `update`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: usize,
    /// Matched records whose content actually changed
    pub modified: usize,
}

/// Which state `find_one_and_update` hands back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    #[default]
    Before,
    After,
}

#[derive(Debug, Clone)]
pub struct Collection {
    path: PathBuf,
    schema: Schema,
    options: WriteOptions,
}

impl Collection {
    // ========== CONSTRUCTOR ==========

    /// Bind to `path`, creating an empty file if none exists.
    pub fn open(path: impl Into<PathBuf>, schema: Schema) -> Result<Self> {
        Self::open_with_config(path, schema, WriteOptions::default())
    }

    pub fn open_with_config(
        path: impl Into<PathBuf>,
        schema: Schema,
        options: WriteOptions,
    ) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_at(&path))?;
        if file.metadata().map_err(io_at(&path))?.is_dir() {
            return Err(LineBaseError::InvalidName(format!(
                "{} is a directory",
                path.display()
            )));
        }

        Ok(Collection {
            path,
            schema,
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem, e.g. `users` for `data/app/users.json`
    pub fn name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn write_options(&self) -> &WriteOptions {
        &self.options
    }

    // ========== WRITES: APPEND ==========

    /// Append one record. Returns `&Self` so inserts can be chained.
    pub fn insert(&self, record: Document) -> Result<&Self> {
        self.insert_many(std::iter::once(record))?;
        Ok(self)
    }

    /// Append a batch of records with a single write; returns how many.
    pub fn insert_many<I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut buffer = String::new();
        let mut count = 0;
        for record in records {
            let undeclared = self.schema.undeclared(&record);
            if !undeclared.is_empty() {
                log_debug!(
                    "{}: record carries undeclared fields {:?}",
                    self.name(),
                    undeclared
                );
            }
            buffer.push_str(&record.encode()?);
            buffer.push('\n');
            count += 1;
        }
        if count == 0 {
            return Ok(0);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(io_at(&self.path))?;
        if lacks_trailing_newline(&mut file).map_err(io_at(&self.path))? {
            buffer.insert(0, '\n');
        }
        file.write_all(buffer.as_bytes()).map_err(io_at(&self.path))?;
        if self.options.sync_on_insert {
            file.sync_data().map_err(io_at(&self.path))?;
        }

        log_trace!("{}: appended {} records", self.name(), count);
        Ok(count)
    }

    // ========== READS: STREAMING ==========

    /// Visit every record matching `filter` in file order; the visitor may
    /// stop the scan by returning `ControlFlow::Break(())`.
    pub fn scan<F>(&self, filter: &Value, visit: F) -> Result<ScanSummary>
    where
        F: FnMut(Document) -> ControlFlow<()>,
    {
        let filter = Filter::parse(filter)?;
        storage::scan(&self.path, &filter, visit)
    }

    /// All matches, in file order
    pub fn find(&self, filter: &Value) -> Result<Vec<Document>> {
        let mut results = Vec::new();
        self.scan(filter, |doc| {
            results.push(doc);
            ControlFlow::Continue(())
        })?;
        Ok(results)
    }

    /// First match; reading stops as soon as it is found
    pub fn find_one(&self, filter: &Value) -> Result<Option<Document>> {
        let mut found = None;
        self.scan(filter, |doc| {
            found = Some(doc);
            ControlFlow::Break(())
        })?;
        Ok(found)
    }

    pub fn count(&self, filter: &Value) -> Result<usize> {
        Ok(self.scan(filter, |_| ControlFlow::Continue(()))?.matched)
    }

    /// Unique values of `field` across matches, first-seen order.
    ///
    /// Arrays contribute their elements. Records without the field contribute
    /// nothing. Equality is structural (`1 == 1.0`, key order ignored).
    pub fn distinct(&self, field: &str, filter: &Value) -> Result<Vec<Value>> {
        let mut seen: AHashSet<String> = AHashSet::new();
        let mut values = Vec::new();

        let mut remember = |value: &Value| {
            if seen.insert(canonical_json_string(value)) {
                values.push(value.clone());
            }
        };

        self.scan(filter, |doc| {
            match doc.get(field) {
                Some(Value::Array(items)) => items.iter().for_each(&mut remember),
                Some(value) => remember(value),
                None => {}
            }
            ControlFlow::Continue(())
        })?;
        Ok(values)
    }

    /// Matches with `projection` applied
    pub fn project(&self, filter: &Value, projection: &Projection) -> Result<Vec<Document>> {
        let mut results = Vec::new();
        self.scan(filter, |doc| {
            results.push(projection.apply(doc));
            ControlFlow::Continue(())
        })?;
        Ok(results)
    }

    /// Page `page` (1-based) of `page_size` matches.
    ///
    /// `total` is always the exact number of matches in the whole file. This
    /// deliberately differs from a paginator that stops reading as soon as the
    /// page is full, whose total only counts the matches seen up to that point
    /// and so under-counts on every page but the last. Here the scan always
    /// runs to the end of the file. Only the requested page is kept in memory,
    /// but every call costs one full read.
    pub fn paginate(&self, filter: &Value, page: usize, page_size: usize) -> Result<Page> {
        let start = page_offset(page, page_size)?;
        let end = start.saturating_add(page_size);

        let mut records = Vec::with_capacity(page_size.min(1024));
        let mut position = 0usize;
        let summary = self.scan(filter, |doc| {
            if position >= start && position < end {
                records.push(doc);
            }
            position += 1;
            ControlFlow::Continue(())
        })?;

        Ok(Page {
            records,
            total: summary.matched,
            page,
            page_size,
        })
    }

    // ========== WRITES: REWRITE ==========

    /// Apply `patch` to every match.
    ///
    /// A plain object is shallow-merged. An object whose keys are all update
    /// operators (`$set`, `$unset`, `$inc`) applies those instead. Records
    /// that do not match, or that the patch leaves unchanged, keep their
    /// exact bytes.
    pub fn update(&self, filter: &Value, patch: &Value) -> Result<UpdateResult> {
        let filter = Filter::parse(filter)?;
        let spec = UpdateSpec::parse(patch)?;

        let mut result = UpdateResult::default();
        storage::rewrite(&self.path, &self.options, |doc| {
            if !filter.matches(doc) {
                return Ok(RewriteAction::Keep);
            }
            result.matched += 1;
            let mut updated = doc.clone();
            if spec.apply(&mut updated)? {
                result.modified += 1;
                Ok(RewriteAction::Replace(updated))
            } else {
                Ok(RewriteAction::Keep)
            }
        })?;

        log_debug!(
            "{}: update matched={} modified={}",
            self.name(),
            result.matched,
            result.modified
        );
        Ok(result)
    }

    /// Remove every match; returns how many were removed.
    pub fn delete(&self, filter: &Value) -> Result<usize> {
        let filter = Filter::parse(filter)?;
        let summary = storage::rewrite(&self.path, &self.options, |doc| {
            Ok(if filter.matches(doc) {
                RewriteAction::Drop
            } else {
                RewriteAction::Keep
            })
        })?;
        Ok(summary.dropped)
    }

    /// Update only the first match in file order and return it, before or
    /// after the update. `None` when nothing matched.
    pub fn find_one_and_update(
        &self,
        filter: &Value,
        patch: &Value,
        return_document: ReturnDocument,
    ) -> Result<Option<Document>> {
        let filter = Filter::parse(filter)?;
        let spec = UpdateSpec::parse(patch)?;

        let mut outcome: Option<Document> = None;
        let mut done = false;
        storage::rewrite(&self.path, &self.options, |doc| {
            if done || !filter.matches(doc) {
                return Ok(RewriteAction::Keep);
            }
            done = true;

            let mut updated = doc.clone();
            let changed = spec.apply(&mut updated)?;
            outcome = Some(match return_document {
                ReturnDocument::Before => doc.clone(),
                ReturnDocument::After => updated.clone(),
            });
            Ok(if changed {
                RewriteAction::Replace(updated)
            } else {
                RewriteAction::Keep
            })
        })?;
        Ok(outcome)
    }

    /// Remove only the first match in file order and return it.
    pub fn find_one_and_delete(&self, filter: &Value) -> Result<Option<Document>> {
        let filter = Filter::parse(filter)?;

        let mut removed: Option<Document> = None;
        storage::rewrite(&self.path, &self.options, |doc| {
            if removed.is_none() && filter.matches(doc) {
                removed = Some(doc.clone());
                Ok(RewriteAction::Drop)
            } else {
                Ok(RewriteAction::Keep)
            }
        })?;
        Ok(removed)
    }

    /// Re-encode every record compactly and drop blank lines.
    pub fn compact(&self) -> Result<RewriteSummary> {
        storage::rewrite(&self.path, &self.options, |doc| {
            Ok(RewriteAction::Replace(doc.clone()))
        })
    }

    // ========== AGGREGATION ==========

    /// Run an aggregation pipeline.
    ///
    /// The pipeline is validated before the file is touched. Execution loads
    /// the whole collection into memory.
    pub fn aggregate(&self, pipeline: &Value) -> Result<Vec<Document>> {
        let pipeline = Pipeline::from_json(pipeline)?;
        let docs = storage::read_all(&self.path)?;
        log_trace!("{}: aggregating {} records", self.name(), docs.len());
        Ok(pipeline.execute(docs))
    }
}

/// True when the file is non-empty and its last byte is not a newline
fn lacks_trailing_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
