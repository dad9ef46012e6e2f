// linebase-core/src/error.rs

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LineBaseError {
    /// A collection line failed to decode into a record
    #[error("Malformed record at line {line}: {reason} (near `{snippet}`)")]
    MalformedRecord {
        line: usize,
        snippet: String,
        reason: String,
    },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Access denied: {}", .0.display())]
    AccessDenied(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Aggregation error: {0}")]
    AggregationError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),
}

impl From<serde_json::Error> for LineBaseError {
    fn from(err: serde_json::Error) -> Self {
        LineBaseError::Serialization(err.to_string())
    }
}

impl LineBaseError {
    /// Classify an I/O error raised while touching `path`.
    ///
    /// NotFound and PermissionDenied keep the path so callers can tell which
    /// collection was affected; everything else passes through unchanged.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => LineBaseError::FileNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => LineBaseError::AccessDenied(path.to_path_buf()),
            _ => LineBaseError::Io(err),
        }
    }

    pub(crate) fn malformed(line: usize, text: &str, reason: impl Into<String>) -> Self {
        const SNIPPET_CHARS: usize = 40;
        let trimmed = text.trim();
        let snippet = if trimmed.chars().count() > SNIPPET_CHARS {
            let head: String = trimmed.chars().take(SNIPPET_CHARS).collect();
            format!("{}...", head)
        } else {
            trimmed.to_string()
        };
        LineBaseError::MalformedRecord {
            line,
            snippet,
            reason: reason.into(),
        }
    }
}

/// Closure adapter for `map_err`: `File::open(p).map_err(io_at(p))?`
pub(crate) fn io_at(path: &Path) -> impl FnOnce(io::Error) -> LineBaseError + '_ {
    move |err| LineBaseError::from_io(path, err)
}

pub type Result<T> = std::result::Result<T, LineBaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_not_found() {
        let err = LineBaseError::from_io(
            Path::new("/data/users.json"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, LineBaseError::FileNotFound(ref p) if p == Path::new("/data/users.json")));
    }

    #[test]
    fn test_from_io_maps_permission_denied() {
        let err = LineBaseError::from_io(
            Path::new("locked.json"),
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, LineBaseError::AccessDenied(_)));
    }

    #[test]
    fn test_from_io_passes_other_kinds_through() {
        let err = LineBaseError::from_io(
            Path::new("x.json"),
            io::Error::new(io::ErrorKind::UnexpectedEof, "short read"),
        );
        assert!(matches!(err, LineBaseError::Io(_)));
    }

    #[test]
    fn test_malformed_snippet_is_truncated() {
        let long_line = "x".repeat(200);
        let err = LineBaseError::malformed(7, &long_line, "bad json");
        match err {
            LineBaseError::MalformedRecord { line, snippet, .. } => {
                assert_eq!(line, 7);
                assert!(snippet.ends_with("..."));
                assert_eq!(snippet.chars().count(), 43);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
