// linebase-core/src/lib.rs
// Line-oriented JSON record store: one record per line, one file per collection

pub mod aggregation;
pub mod auth;
pub mod collection;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod find_options;
pub mod logging;
pub mod query;
pub mod storage;
pub mod value_utils;

// Public exports
pub use aggregation::{Pipeline, Stage};
pub use auth::{connect, connect_with_config, init_database, init_database_with_config, Credential, USER_MODEL};
pub use collection::{Collection, ReturnDocument, Schema, UpdateResult};
pub use config::{DatabaseConfig, WriteOptions};
pub use database::Database;
pub use document::{decode, decode_line, encode, Document};
pub use error::{LineBaseError, Result};
pub use find_options::{Page, Projection};
pub use logging::{get_log_level, init_from_env, set_log_level, LogLevel};
pub use query::{matches_filter, Filter};
pub use storage::{RewriteAction, RewriteSummary, ScanSummary};
