//! Configuration and logging setup for chat-cli.

use anyhow::{Context, Result};
use chat_server::Config;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "chat_cli=info,pairchat_server=info,pairchat_client=info,warn";

/// Install the stderr log subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the hub configuration.
///
/// Precedence for the database path: `--database`, then the config file,
/// then `pairchat.db` in the user data directory.
pub async fn load(config_path: Option<&Path>, database: Option<PathBuf>) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(database) = database {
        config.storage.database = database;
    } else if config_path.is_none() {
        let data_dir = default_data_dir()?;
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;
        config.storage.database = data_dir.join("pairchat.db");
    }

    tracing::debug!("Using database {}", config.storage.database.display());
    Ok(config)
}

/// Get the default data directory for chat-cli.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "pairchat", "chat-cli")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[tokio::test]
    async fn database_flag_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[storage]\ndatabase = \"from-file.db\"").unwrap();

        let config = load(Some(&path), Some(PathBuf::from("flag.db")))
            .await
            .unwrap();
        assert_eq!(config.storage.database, PathBuf::from("flag.db"));

        let config = load(Some(&path), None).await.unwrap();
        assert_eq!(config.storage.database, PathBuf::from("from-file.db"));
    }

    #[tokio::test]
    async fn bad_config_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load(Some(&dir.path().join("missing.toml")), None)
            .await
            .is_err());
    }
}
