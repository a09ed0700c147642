use std::path::{Path, PathBuf};

use mailrail_delivery::DeliveryConfig;
use mailrail_queue::QueueConfig;
use serde::Deserialize;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "MAILRAIL_CONFIG";

/// Environment variable consulted when no region is configured
pub const REGION_ENV: &str = "AWS_DEFAULT_REGION";

/// Locations searched, in order, when [`CONFIG_ENV`] is unset
pub const DEFAULT_CONFIG_PATHS: [&str; 2] =
    ["./mailrail.config.ron", "/etc/mailrail/mailrail.config.ron"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("MAILRAIL_CONFIG points to non-existent file: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },

    #[error("No region configured: set `region` in the config file or AWS_DEFAULT_REGION")]
    MissingRegion,
}

/// Process configuration
///
/// # Examples
///
/// ```ron
/// (
///     region: "us-west-2",
///     queue: (type: "File", path: "/var/spool/mailrail"),
///     delivery: (
///         poll_interval_secs: 1,
///         rate: (floor_per_sec: 1.0, recovery_secs: 300),
///     ),
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    /// Region of the transmission service
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Load the configuration from the first file found
    ///
    /// Defaults are used when there is no file at all.
    ///
    /// # Errors
    /// If [`CONFIG_ENV`] names a missing file, or the file found cannot be
    /// read or parsed
    pub fn load() -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let defaults = DEFAULT_CONFIG_PATHS.map(PathBuf::from);

        match find_config_file(env_path, &defaults)? {
            Some(path) => Self::from_file(&path),
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The region to send from, falling back to [`REGION_ENV`]
    ///
    /// # Errors
    /// `MissingRegion` if neither is set
    pub fn region(&self) -> Result<String, ConfigError> {
        resolve_region(self.region.as_deref(), std::env::var(REGION_ENV).ok())
    }
}

/// Find the configuration file using the following precedence:
/// 1. the path named by [`CONFIG_ENV`], which must exist
/// 2. the first of `defaults` that exists
fn find_config_file(
    env_path: Option<PathBuf>,
    defaults: &[PathBuf],
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = env_path {
        return if path.exists() {
            Ok(Some(path))
        } else {
            Err(ConfigError::NotFound(path))
        };
    }

    Ok(defaults.iter().find(|path| path.exists()).cloned())
}

fn resolve_region(configured: Option<&str>, env: Option<String>) -> Result<String, ConfigError> {
    configured
        .map(str::to_string)
        .or(env)
        .filter(|region| !region.is_empty())
        .ok_or(ConfigError::MissingRegion)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = ron::from_str("()").expect("valid RON");
        assert_eq!(config, Config::default());
        assert_eq!(config.queue.path(), Some(Path::new("/var/spool/mailrail")));
    }

    #[test]
    fn test_full_config() {
        let config: Config = ron::from_str(
            r#"(
                region: "us-west-2",
                queue: (type: "Memory"),
                delivery: (
                    poll_interval_secs: 10,
                    rate: (floor_per_sec: 2.0, recovery_secs: 60),
                    transient_codes: ["Throttling"],
                ),
            )"#,
        )
        .expect("valid RON");

        assert_eq!(config.region.as_deref(), Some("us-west-2"));
        assert_eq!(config.queue, QueueConfig::Memory);
        assert_eq!(config.delivery.poll_interval_secs, 10);
        assert_eq!(config.delivery.rate.recovery_secs, 60);
    }

    #[test]
    fn test_region_precedence() {
        assert_eq!(
            resolve_region(Some("eu-west-1"), Some("us-east-1".to_string())).expect("region"),
            "eu-west-1"
        );
        assert_eq!(
            resolve_region(None, Some("us-east-1".to_string())).expect("region"),
            "us-east-1"
        );
        assert!(matches!(
            resolve_region(None, None),
            Err(ConfigError::MissingRegion)
        ));
        assert!(matches!(
            resolve_region(Some(""), None),
            Err(ConfigError::MissingRegion)
        ));
    }

    #[test]
    fn test_find_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("mailrail.config.ron");
        std::fs::write(&present, "()").expect("write");
        let absent = dir.path().join("missing.ron");

        assert_eq!(
            find_config_file(None, &[absent.clone(), present.clone()]).expect("search"),
            Some(present.clone())
        );
        assert_eq!(
            find_config_file(None, std::slice::from_ref(&absent)).expect("search"),
            None
        );
        assert_eq!(
            find_config_file(Some(present.clone()), &[]).expect("search"),
            Some(present)
        );
        assert!(matches!(
            find_config_file(Some(absent), &[]),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.ron");
        std::fs::write(&path, "(queue: 7)").expect("write");

        let err = Config::from_file(&path).expect_err("invalid config");
        assert!(err.to_string().contains("broken.ron"), "{err}");
    }
}
