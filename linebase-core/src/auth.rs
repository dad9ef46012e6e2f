// linebase-core/src/auth.rs
// Credential bootstrap: the `user` model of every database

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::collection::Schema;
use crate::config::DatabaseConfig;
use crate::database::Database;
use crate::document::Document;
use crate::error::{LineBaseError, Result};
use crate::{log_info, log_warn};

/// Model holding the credential records
pub const USER_MODEL: &str = "user";

/// One line of the `user` model. Passwords are stored and compared as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential {
            username: username.into(),
            password: password.into(),
        }
    }

    fn to_document(&self) -> Result<Document> {
        Document::from_value(serde_json::to_value(self)?)
    }
}

/// Open `db` if `username`/`password` match a record of its `user` model.
///
/// Every failure (missing database, missing or malformed credential file, no
/// matching pair) is reported as `AuthenticationFailed`.
pub fn connect(
    root: impl AsRef<Path>,
    db: &str,
    username: &str,
    password: &str,
) -> Result<Database> {
    connect_with_config(root, db, username, password, DatabaseConfig::default())
}

pub fn connect_with_config(
    root: impl AsRef<Path>,
    db: &str,
    username: &str,
    password: &str,
    config: DatabaseConfig,
) -> Result<Database> {
    match authenticate(root.as_ref(), db, username, password, config) {
        Ok(database) => {
            log_info!("User '{}' connected to '{}'", username, db);
            Ok(database)
        }
        Err(e) => {
            log_warn!("Authentication failed for '{}' on '{}': {}", username, db, e);
            Err(LineBaseError::AuthenticationFailed(format!(
                "user '{}' on database '{}'",
                username, db
            )))
        }
    }
}

fn authenticate(
    root: &Path,
    db: &str,
    username: &str,
    password: &str,
    config: DatabaseConfig,
) -> Result<Database> {
    let database = Database::open_with_config(root, db, config)?;
    let users = database.model(USER_MODEL)?;
    let filter = json!({ "username": username, "password": password });
    match users.find_one(&filter)? {
        Some(_) => Ok(database),
        None => Err(LineBaseError::AuthenticationFailed(
            "no matching credential".to_string(),
        )),
    }
}

/// Create `db` with its `user` model holding one credential.
/// Nothing is left behind when any step fails.
pub fn init_database(
    root: impl AsRef<Path>,
    db: &str,
    username: &str,
    password: &str,
) -> Result<Database> {
    init_database_with_config(root, db, username, password, DatabaseConfig::default())
}

pub fn init_database_with_config(
    root: impl AsRef<Path>,
    db: &str,
    username: &str,
    password: &str,
    config: DatabaseConfig,
) -> Result<Database> {
    if username.is_empty() || password.is_empty() {
        return Err(LineBaseError::InvalidQuery(
            "username and password must not be empty".to_string(),
        ));
    }
    let root = root.as_ref();
    let database = Database::create_with_config(root, db, config)?;

    let seeded = database
        .create_model(USER_MODEL, Schema::new(["username", "password"]))
        .and_then(|users| {
            users.insert(Credential::new(username, password).to_document()?)?;
            Ok(())
        });

    if let Err(e) = seeded {
        return Err(discard_partial(root, db, e));
    }

    log_info!("Initialised database '{}' with user '{}'", db, username);
    Ok(database)
}

/// Remove a half-initialised database. Returns `cause`, which is what the
/// caller reports even if the removal fails too.
fn discard_partial(root: &Path, db: &str, cause: LineBaseError) -> LineBaseError {
    if let Err(cleanup) = Database::delete(root, db) {
        log_warn!(
            "Could not remove partially initialised database '{}' after '{}': {}",
            db,
            cause,
            cleanup
        );
    }
    cause
}
