//! Layered runtime configuration.
//!
//! Settings resolve in the usual order — `storyboard.toml` in the project
//! directory, then environment variables, then CLI flags, with later layers
//! winning. A relative database path is anchored at the project directory so
//! the tracker behaves the same no matter where it is launched from.
//!
//! ```toml
//! [server]
//! port = 4150
//! db_path = ".storyboard/tracker.db"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 4150;
pub const DEFAULT_DB_PATH: &str = ".storyboard/tracker.db";
pub const CONFIG_FILE: &str = "storyboard.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
}

impl Config {
    /// Load configuration for a project directory, folding in environment
    /// variables and CLI overrides.
    pub fn load(
        project_dir: &Path,
        cli_port: Option<u16>,
        cli_db_path: Option<PathBuf>,
    ) -> Result<Self> {
        let file = Self::read_file(&project_dir.join(CONFIG_FILE))?;
        let env_port = std::env::var("STORYBOARD_PORT")
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("Invalid STORYBOARD_PORT value")?;
        let env_db_path = std::env::var("STORYBOARD_DB_PATH").ok().map(PathBuf::from);

        Ok(Self::resolve(
            project_dir,
            &file,
            env_port,
            env_db_path,
            cli_port,
            cli_db_path,
        ))
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn resolve(
        project_dir: &Path,
        file: &FileConfig,
        env_port: Option<u16>,
        env_db_path: Option<PathBuf>,
        cli_port: Option<u16>,
        cli_db_path: Option<PathBuf>,
    ) -> Self {
        let port = cli_port
            .or(env_port)
            .or(file.server.port)
            .unwrap_or(DEFAULT_PORT);
        let db_path = cli_db_path
            .or(env_db_path)
            .or_else(|| file.server.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let db_path = if db_path.is_absolute() {
            db_path
        } else {
            project_dir.join(db_path)
        };
        Self { port, db_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_when_nothing_is_set() {
        let config = Config::resolve(
            Path::new("/proj"),
            &FileConfig::default(),
            None,
            None,
            None,
            None,
        );
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.db_path, PathBuf::from("/proj/.storyboard/tracker.db"));
    }

    #[test]
    fn test_cli_beats_env_beats_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [server]
            port = 1111
            db_path = "file.db"
            "#,
        )
        .unwrap();

        let env_only = Config::resolve(Path::new("/proj"), &file, Some(2222), None, None, None);
        assert_eq!(env_only.port, 2222);
        assert_eq!(env_only.db_path, PathBuf::from("/proj/file.db"));

        let cli_wins = Config::resolve(
            Path::new("/proj"),
            &file,
            Some(2222),
            Some(PathBuf::from("/env.db")),
            Some(3333),
            Some(PathBuf::from("/cli.db")),
        );
        assert_eq!(cli_wins.port, 3333);
        assert_eq!(cli_wins.db_path, PathBuf::from("/cli.db"));
    }

    #[test]
    fn test_absolute_db_path_is_left_alone() {
        let config = Config::resolve(
            Path::new("/proj"),
            &FileConfig::default(),
            None,
            Some(PathBuf::from("/var/data/tracker.db")),
            None,
            None,
        );
        assert_eq!(config.db_path, PathBuf::from("/var/data/tracker.db"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::read_file(Path::new("/nonexistent/storyboard.toml")).unwrap();
        assert!(config.server.port.is_none());
        assert!(config.server.db_path.is_none());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[server\nport = nope").unwrap();
        assert!(Config::read_file(&path).is_err());
    }
}
