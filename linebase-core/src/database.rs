// linebase-core/src/database.rs
// Database = a directory of collection files under a root directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use chrono::Utc;
use parking_lot::RwLock;

use crate::collection::{Collection, Schema};
use crate::config::DatabaseConfig;
use crate::error::{io_at, LineBaseError, Result};
use crate::storage::RewriteSummary;
use crate::{log_debug, log_info};

/// Database and model names: `[A-Za-z0-9_-]+`
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(LineBaseError::InvalidName(format!(
            "{} name '{}' must match [A-Za-z0-9_-]+",
            kind, name
        )))
    }
}

/// Handle on `<root>/<name>/`
pub struct Database {
    root: PathBuf,
    name: String,
    dir: PathBuf,
    config: DatabaseConfig,
    /// Schemas declared through `create_model` by this handle
    schemas: RwLock<AHashMap<String, Schema>>,
}

impl Database {
    // ========== LIFECYCLE ==========

    /// Create a new, empty database. Fails if it already exists.
    pub fn create(root: impl AsRef<Path>, name: &str) -> Result<Self> {
        Self::create_with_config(root, name, DatabaseConfig::default())
    }

    pub fn create_with_config(
        root: impl AsRef<Path>,
        name: &str,
        config: DatabaseConfig,
    ) -> Result<Self> {
        validate_name("database", name)?;
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(io_at(root))?;

        let dir = root.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(LineBaseError::AlreadyExists(format!("database '{}'", name)))
            }
            Err(e) => return Err(LineBaseError::from_io(&dir, e)),
        }

        log_info!("Created database '{}' at {}", name, dir.display());
        Ok(Self::handle(root, name, dir, config))
    }

    /// Open an existing database.
    pub fn open(root: impl AsRef<Path>, name: &str) -> Result<Self> {
        Self::open_with_config(root, name, DatabaseConfig::default())
    }

    pub fn open_with_config(
        root: impl AsRef<Path>,
        name: &str,
        config: DatabaseConfig,
    ) -> Result<Self> {
        validate_name("database", name)?;
        let root = root.as_ref();
        let dir = root.join(name);
        if !dir.is_dir() {
            return Err(LineBaseError::DatabaseNotFound(name.to_string()));
        }
        log_debug!("Opened database '{}'", name);
        Ok(Self::handle(root, name, dir, config))
    }

    /// Remove a database directory and everything in it.
    pub fn delete(root: impl AsRef<Path>, name: &str) -> Result<()> {
        validate_name("database", name)?;
        let dir = root.as_ref().join(name);
        if !dir.is_dir() {
            return Err(LineBaseError::DatabaseNotFound(name.to_string()));
        }
        fs::remove_dir_all(&dir).map_err(io_at(&dir))?;
        log_info!("Deleted database '{}'", name);
        Ok(())
    }

    /// Names of the databases under `root`, sorted. A missing root has none.
    pub fn list(root: impl AsRef<Path>) -> Result<Vec<String>> {
        let root = root.as_ref();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LineBaseError::from_io(root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_at(root))?;
            if !entry.file_type().map_err(io_at(root))?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_name("database", name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn handle(root: &Path, name: &str, dir: PathBuf, config: DatabaseConfig) -> Self {
        Database {
            root: root.to_path_buf(),
            name: name.to_string(),
            dir,
            config,
            schemas: RwLock::new(AHashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<name>`
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    // ========== MODELS ==========

    /// Path of the backing file for `model`
    pub fn model_path(&self, model: &str) -> PathBuf {
        self.dir.join(self.config.file_name(model))
    }

    /// Make sure `model` has a backing file (created empty) and return a handle.
    /// Calling it for an existing model keeps its data.
    pub fn create_model(&self, model: &str, schema: Schema) -> Result<Collection> {
        validate_name("model", model)?;
        let collection =
            Collection::open_with_config(self.model_path(model), schema.clone(), self.config.write)?;
        self.schemas.write().insert(model.to_string(), schema);
        log_debug!("Model '{}' ready in '{}'", model, self.name);
        Ok(collection)
    }

    /// Handle on an existing model
    pub fn model(&self, model: &str) -> Result<Collection> {
        validate_name("model", model)?;
        let path = self.model_path(model);
        if !path.is_file() {
            return Err(LineBaseError::CollectionNotFound(model.to_string()));
        }
        let schema = self.schemas.read().get(model).cloned().unwrap_or_default();
        Collection::open_with_config(path, schema, self.config.write)
    }

    /// Model names (file stems with the configured extension), sorted
    pub fn list_models(&self) -> Result<Vec<String>> {
        let mut models = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_at(&self.dir))? {
            let entry = entry.map_err(io_at(&self.dir))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let stem = if self.config.extension.is_empty() {
                Some(file_name)
            } else {
                file_name
                    .strip_suffix(self.config.extension.as_str())
                    .and_then(|rest| rest.strip_suffix('.'))
            };
            if let Some(stem) = stem {
                if validate_name("model", stem).is_ok() {
                    models.push(stem.to_string());
                }
            }
        }
        models.sort();
        Ok(models)
    }

    pub fn delete_model(&self, model: &str) -> Result<()> {
        validate_name("model", model)?;
        let path = self.model_path(model);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LineBaseError::CollectionNotFound(model.to_string()))
            }
            Err(e) => return Err(LineBaseError::from_io(&path, e)),
        }
        self.schemas.write().remove(model);
        log_info!("Deleted model '{}' from '{}'", model, self.name);
        Ok(())
    }

    /// Rewrite a model compactly (blank lines dropped, records re-encoded)
    pub fn compact_model(&self, model: &str) -> Result<RewriteSummary> {
        let summary = self.model(model)?.compact()?;
        log_info!(
            "Compacted '{}.{}': {} -> {} bytes",
            self.name,
            model,
            summary.size_before,
            summary.size_after
        );
        Ok(summary)
    }

    // ========== BACKUP ==========

    /// Copy every model file into `<backup_dir>/<db>-<UTC timestamp>/`.
    /// Returns the snapshot directory.
    pub fn backup(&self) -> Result<PathBuf> {
        let backup_root = self.config.backup_dir_for(&self.root);
        fs::create_dir_all(&backup_root).map_err(io_at(&backup_root))?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let target = create_snapshot_dir(&backup_root, &format!("{}-{}", self.name, stamp))?;

        let models = self.list_models()?;
        for model in &models {
            let source = self.model_path(model);
            let file_name = self.config.file_name(model);
            fs::copy(&source, target.join(&file_name)).map_err(io_at(&source))?;
        }

        log_info!(
            "Backed up '{}' ({} models) to {}",
            self.name,
            models.len(),
            target.display()
        );
        Ok(target)
    }
}

/// Create `<dir>/<base>`, or `<base>-1`, `<base>-2`, ... when taken
fn create_snapshot_dir(dir: &Path, base: &str) -> Result<PathBuf> {
    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            base.to_string()
        } else {
            format!("{}-{}", base, suffix)
        };
        let target = dir.join(name);
        match fs::create_dir(&target) {
            Ok(()) => return Ok(target),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && suffix < u32::MAX => suffix += 1,
            Err(e) => return Err(LineBaseError::from_io(&target, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_validate_name() {
        for good in ["users", "user_2", "A-b-C"] {
            assert!(validate_name("model", good).is_ok(), "{}", good);
        }
        for bad in ["", "a b", "../etc", "x.json", ".hidden", "ünicode"] {
            assert!(
                matches!(validate_name("model", bad), Err(LineBaseError::InvalidName(_))),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_create_open_delete_lifecycle() {
        let root = TempDir::new().unwrap();

        let db = Database::create(root.path(), "shop").unwrap();
        assert_eq!(db.path(), root.path().join("shop"));
        assert!(matches!(
            Database::create(root.path(), "shop"),
            Err(LineBaseError::AlreadyExists(_))
        ));

        assert_eq!(Database::open(root.path(), "shop").unwrap().name(), "shop");
        assert!(matches!(
            Database::open(root.path(), "nope"),
            Err(LineBaseError::DatabaseNotFound(_))
        ));

        Database::delete(root.path(), "shop").unwrap();
        assert!(!root.path().join("shop").exists());
        assert!(matches!(
            Database::delete(root.path(), "shop"),
            Err(LineBaseError::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn test_list_databases() {
        let root = TempDir::new().unwrap();
        assert!(Database::list(root.path().join("missing")).unwrap().is_empty());

        Database::create(root.path(), "b").unwrap();
        Database::create(root.path(), "a").unwrap();
        fs::write(root.path().join("stray.txt"), "x").unwrap();
        fs::create_dir(root.path().join(".backups")).unwrap();

        assert_eq!(Database::list(root.path()).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_models() {
        let root = TempDir::new().unwrap();
        let db = Database::create(root.path(), "app").unwrap();

        let users = db.create_model("users", Schema::new(["name"])).unwrap();
        assert_eq!(fs::read_to_string(users.path()).unwrap(), "");
        users
            .insert(Document::from_value(json!({"name": "Alice"})).unwrap())
            .unwrap();

        // re-creating keeps data
        let again = db.create_model("users", Schema::new(["name"])).unwrap();
        assert_eq!(again.count(&json!({})).unwrap(), 1);

        db.create_model("orders", Schema::empty()).unwrap();
        fs::write(db.path().join("notes.txt"), "ignored").unwrap();
        assert_eq!(db.list_models().unwrap(), vec!["orders", "users"]);

        let opened = db.model("users").unwrap();
        assert_eq!(opened.schema().fields(), &["name".to_string()]);
        assert!(matches!(db.model("ghosts"), Err(LineBaseError::CollectionNotFound(_))));
        assert!(matches!(db.create_model("bad name", Schema::empty()), Err(LineBaseError::InvalidName(_))));

        db.delete_model("orders").unwrap();
        assert!(matches!(db.delete_model("orders"), Err(LineBaseError::CollectionNotFound(_))));
        assert_eq!(db.list_models().unwrap(), vec!["users"]);
    }

    #[test]
    fn test_custom_extension() {
        let root = TempDir::new().unwrap();
        let config = DatabaseConfig::new().with_extension("jsonl");
        let db = Database::create_with_config(root.path(), "logs", config).unwrap();
        db.create_model("events", Schema::empty()).unwrap();
        fs::write(db.path().join("other.json"), "").unwrap();

        assert!(db.path().join("events.jsonl").is_file());
        assert_eq!(db.list_models().unwrap(), vec!["events"]);
    }

    #[test]
    fn test_compact_model() {
        let root = TempDir::new().unwrap();
        let db = Database::create(root.path(), "app").unwrap();
        let coll = db.create_model("items", Schema::empty()).unwrap();
        fs::write(coll.path(), "{ \"a\": 1 }\n\n{\"a\" : 2}\n").unwrap();

        let summary = db.compact_model("items").unwrap();
        assert!(summary.size_after < summary.size_before);
        assert_eq!(fs::read_to_string(coll.path()).unwrap(), "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn test_backup_copies_models() {
        let root = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let db = Database::create_with_config(
            root.path(),
            "app",
            DatabaseConfig::new().with_backup_dir(backups.path()),
        )
        .unwrap();
        let coll = db.create_model("items", Schema::empty()).unwrap();
        coll.insert(Document::from_value(json!({"n": 1})).unwrap()).unwrap();

        let snapshot = db.backup().unwrap();
        assert!(snapshot.starts_with(backups.path()));
        let dir_name = snapshot.file_name().unwrap().to_string_lossy().into_owned();
        assert!(dir_name.starts_with("app-"));
        assert!(dir_name.ends_with('Z'));
        assert_eq!(
            fs::read_to_string(snapshot.join("items.json")).unwrap(),
            fs::read_to_string(coll.path()).unwrap()
        );
    }

    #[test]
    fn test_repeated_backups_get_distinct_directories() {
        let root = TempDir::new().unwrap();
        let db = Database::create(root.path(), "shop").unwrap();
        db.create_model("items", Schema::empty()).unwrap();

        let snapshots: Vec<PathBuf> = (0..5).map(|_| db.backup().unwrap()).collect();
        let unique: std::collections::HashSet<_> = snapshots.iter().collect();
        assert_eq!(unique.len(), snapshots.len());
        for snapshot in &snapshots {
            assert!(snapshot.join("items.json").is_file());
        }
    }

    #[test]
    fn test_snapshot_dir_suffix_on_collision() {
        let dir = TempDir::new().unwrap();
        let first = create_snapshot_dir(dir.path(), "app-20260101T000000.000Z").unwrap();
        let second = create_snapshot_dir(dir.path(), "app-20260101T000000.000Z").unwrap();
        assert_eq!(first, dir.path().join("app-20260101T000000.000Z"));
        assert_eq!(second, dir.path().join("app-20260101T000000.000Z-1"));
    }

    #[test]
    fn test_database_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Database>();
    }
}
