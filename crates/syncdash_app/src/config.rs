use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use syncdash_engine::{ClientSettings, DashboardSettings};
use syncdash_logging::LevelFilter;
use thiserror::Error;

pub(crate) const CONFIG_FILENAME: &str = "config.ron";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
    #[error("unknown log level {0:?}")]
    LogLevel(String),
}

/// Contents of `config.ron`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct FileConfig {
    pub base_url: Option<String>,
    pub poll_interval_ms: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub log_to_file: bool,
    /// Refresh period of `stats --watch`.
    pub stats_refresh_secs: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        let client = ClientSettings::default();
        Self {
            base_url: None,
            poll_interval_ms: DashboardSettings::default().poll_interval.as_millis() as u64,
            connect_timeout_secs: client.connect_timeout.as_secs(),
            request_timeout_secs: client.request_timeout.as_secs(),
            log_level: "info".to_string(),
            log_to_file: false,
            stats_refresh_secs: 30,
        }
    }
}

impl FileConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub verbose: u8,
    pub log_to_file: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub state_dir: PathBuf,
    pub client: ClientSettings,
    pub dashboard: DashboardSettings,
    pub stats_refresh: Duration,
    pub log_level: LevelFilter,
    pub log_to_file: bool,
}

impl Settings {
    pub(crate) fn resolve(
        state_dir: PathBuf,
        file: FileConfig,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        let mut log_level: LevelFilter = file
            .log_level
            .parse()
            .map_err(|_| ConfigError::LogLevel(file.log_level.clone()))?;
        log_level = match overrides.verbose {
            0 => log_level,
            1 => log_level.max(LevelFilter::Debug),
            _ => LevelFilter::Trace,
        };

        let defaults = ClientSettings::default();
        let client = ClientSettings {
            base_url: overrides
                .base_url
                .or(file.base_url)
                .unwrap_or(defaults.base_url),
            token: overrides.token,
            connect_timeout: Duration::from_secs(file.connect_timeout_secs),
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            max_response_bytes: defaults.max_response_bytes,
        };
        let dashboard = DashboardSettings {
            poll_interval: Duration::from_millis(file.poll_interval_ms.max(100)),
        };

        Ok(Self {
            state_dir,
            client,
            dashboard,
            stats_refresh: Duration::from_secs(file.stats_refresh_secs.max(1)),
            log_level,
            log_to_file: overrides.log_to_file || file.log_to_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = FileConfig::load(&temp.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config, FileConfig::default());
        assert_eq!(config.poll_interval_ms, 2000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        fs::write(
            &path,
            r#"(base_url: Some("https://sync.example"), log_level: "debug")"#,
        )
        .unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://sync.example"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn broken_file_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        fs::write(&path, "(base_url: ").unwrap();
        assert!(matches!(
            FileConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn command_line_wins_over_file() {
        let file = FileConfig {
            base_url: Some("https://from-file".to_string()),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(
            PathBuf::from("/tmp/syncdash"),
            file,
            Overrides {
                base_url: Some("https://from-cli".to_string()),
                token: Some("tok".to_string()),
                verbose: 1,
                log_to_file: false,
            },
        )
        .unwrap();

        assert_eq!(settings.client.base_url, "https://from-cli");
        assert_eq!(settings.client.token.as_deref(), Some("tok"));
        assert_eq!(settings.log_level, LevelFilter::Debug);
        assert_eq!(settings.dashboard.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.stats_refresh, Duration::from_secs(30));
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let file = FileConfig {
            log_level: "loud".to_string(),
            ..FileConfig::default()
        };
        let err = Settings::resolve(PathBuf::new(), file, Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::LogLevel(level) if level == "loud"));
    }
}
