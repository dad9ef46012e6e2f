// linebase-core/src/config.rs
// Database and write configuration

use std::path::{Path, PathBuf};

/// Durability knobs that travel with every `Collection`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// fsync the temporary file before it replaces the collection
    pub sync_on_rewrite: bool,
    /// fsync after every insert batch
    pub sync_on_insert: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            sync_on_rewrite: true,
            sync_on_insert: false,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sync_on_rewrite(mut self, sync: bool) -> Self {
        self.sync_on_rewrite = sync;
        self
    }

    pub fn with_sync_on_insert(mut self, sync: bool) -> Self {
        self.sync_on_insert = sync;
        self
    }
}

/// Per-database settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Collection file extension, without the dot (default: "json")
    pub extension: String,

    pub write: WriteOptions,

    /// Where `backup` puts snapshots; `<root>/.backups` when unset
    pub backup_dir: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            extension: "json".to_string(),
            write: WriteOptions::default(),
            backup_dir: None,
        }
    }
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_sync_on_rewrite(mut self, sync: bool) -> Self {
        self.write.sync_on_rewrite = sync;
        self
    }

    pub fn with_sync_on_insert(mut self, sync: bool) -> Self {
        self.write.sync_on_insert = sync;
        self
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Backup directory resolved against the database root
    pub fn backup_dir_for(&self, root: &Path) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| root.join(".backups"))
    }

    /// `<model>.<extension>`
    pub fn file_name(&self, model: &str) -> String {
        if self.extension.is_empty() {
            model.to_string()
        } else {
            format!("{}.{}", model, self.extension)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.extension, "json");
        assert!(config.write.sync_on_rewrite);
        assert!(!config.write.sync_on_insert);
        assert_eq!(config.backup_dir_for(Path::new("/data")), PathBuf::from("/data/.backups"));
        assert_eq!(config.file_name("users"), "users.json");
    }

    #[test]
    fn test_builder() {
        let config = DatabaseConfig::new()
            .with_extension(".jsonl")
            .with_sync_on_rewrite(false)
            .with_sync_on_insert(true)
            .with_backup_dir("/snapshots");

        assert_eq!(config.file_name("orders"), "orders.jsonl");
        assert_eq!(
            config.write,
            WriteOptions::new().with_sync_on_rewrite(false).with_sync_on_insert(true)
        );
        assert_eq!(config.backup_dir_for(Path::new("/data")), PathBuf::from("/snapshots"));
    }

    #[test]
    fn test_empty_extension() {
        let config = DatabaseConfig::new().with_extension("");
        assert_eq!(config.file_name("raw"), "raw");
    }
}
