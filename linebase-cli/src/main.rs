use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linebase_core::{init_database, LogLevel};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "linebase")]
#[command(about = "LineBase CLI - manage line-oriented JSON databases")]
#[command(version)]
struct Cli {
    /// Directory holding the databases
    #[arg(long, env = "LINEBASE_ROOT", default_value = "./data", global = true)]
    root: PathBuf,

    /// error, warn, info, debug or trace (overrides LINEBASE_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a database and its initial user
    Init {
        /// Database name ([A-Za-z0-9_-]+)
        db: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    linebase_core::init_from_env();
    if let Some(level) = cli.log_level {
        linebase_core::set_log_level(level);
    }

    match cli.command {
        Commands::Init { db, user, password } => {
            let path = init(&cli.root, &db, &user, &password)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Create `<root>/<db>` with its `user` model; returns the database directory
fn init(root: &Path, db: &str, user: &str, password: &str) -> Result<PathBuf> {
    let database = init_database(root, db, user, password).with_context(|| {
        format!("Failed to initialise database '{}' under {}", db, root.display())
    })?;
    Ok(database.path().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_init() {
        let cli = Cli::try_parse_from([
            "linebase", "--root", "/tmp/x", "--log-level", "debug", "init", "shop", "--user", "admin",
            "--password", "pw",
        ])
        .unwrap();
        assert_eq!(cli.root, PathBuf::from("/tmp/x"));
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        match cli.command {
            Commands::Init { db, user, password } => {
                assert_eq!((db.as_str(), user.as_str(), password.as_str()), ("shop", "admin", "pw"));
            }
        }
    }

    #[test]
    fn test_init_creates_then_refuses_existing() {
        let root = TempDir::new().unwrap();
        let path = init(root.path(), "shop", "admin", "pw").unwrap();
        assert_eq!(path, root.path().join("shop"));
        assert!(path.join("user.json").is_file());

        let err = init(root.path(), "shop", "admin", "pw").unwrap_err();
        assert!(format!("{:#}", err).contains("Already exists"));
    }
}
