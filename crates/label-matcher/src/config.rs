//! Configuration management

use label_common::{CommonError, Result};
use std::time::Duration;
use tracing::debug;

use crate::storage::config::StorageConfig;
use crate::wms::PollPolicy;

// ============================================================================
// WMS Configuration Constants
// ============================================================================

/// Report submitted once per batch.
pub const DEFAULT_REPORT_NAME: &str = "Open Orders";

/// Report column holding the order reference.
pub const DEFAULT_ORDER_ID_COLUMN: &str = "OrderID";

/// Timeout for login, report submit and status requests in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timeout for the report data fetch in seconds. Materialized reports can be large.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 90;

/// Fixed delay between report status checks in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Status checks before a report is declared timed out.
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;

/// Bucket used by the operator commands.
pub const DEFAULT_LABELS_BUCKET: &str = "vwslabels";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub wms: WmsConfig,
    pub storage: StorageConfig,
    pub alerts: AlertConfig,
    pub bucket: String,
}

/// Login body for the WMS session endpoint
#[derive(Clone)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
    pub system_id: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("system_id", &self.system_id)
            .finish()
    }
}

/// WMS connection and report settings
#[derive(Debug, Clone)]
pub struct WmsConfig {
    /// API root, without trailing slash (e.g. `https://host/Public.Api/api`)
    pub base_url: String,
    pub login: LoginCredentials,
    pub report_name: String,
    pub order_id_column: String,
    pub request_timeout: Duration,
    pub fetch_timeout: Duration,
    pub poll: PollPolicy,
}

impl WmsConfig {
    /// Settings with default report, timeouts and polling
    pub fn new(base_url: impl Into<String>, login: LoginCredentials) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            login,
            report_name: DEFAULT_REPORT_NAME.to_string(),
            order_id_column: DEFAULT_ORDER_ID_COLUMN.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            poll: PollPolicy {
                interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
                max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(CommonError::config("WMS_BASE_URL cannot be empty"));
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(CommonError::config(format!(
                "WMS_BASE_URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }

        for (name, value) in [
            ("WMS_USERNAME", &self.login.username),
            ("WMS_PASSWORD", &self.login.password),
            ("WMS_SYSTEM_ID", &self.login.system_id),
            ("WMS_REPORT_NAME", &self.report_name),
            ("WMS_ORDER_ID_COLUMN", &self.order_id_column),
        ] {
            if value.trim().is_empty() {
                return Err(CommonError::config(format!("{} cannot be empty", name)));
            }
        }

        if self.poll.max_attempts == 0 {
            return Err(CommonError::config(
                "WMS_POLL_MAX_ATTEMPTS must be greater than 0",
            ));
        }

        if self.request_timeout.is_zero() || self.fetch_timeout.is_zero() {
            return Err(CommonError::config("WMS timeouts must be greater than 0"));
        }

        Ok(())
    }
}

/// Outbound alert channel
#[derive(Debug, Clone, Default)]
pub struct AlertConfig {
    /// SNS topic; alerts are only logged when unset
    pub topic_arn: Option<String>,
}

/// Store settings for the operator commands, which never talk to the WMS
#[derive(Debug, Clone)]
pub struct FolderConfig {
    pub storage: StorageConfig,
    pub bucket: String,
}

impl FolderConfig {
    /// Load from `.env`, the environment and defaults
    pub fn load() -> Result<Self> {
        load_dotenv();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let bucket = labels_bucket();
        if bucket.trim().is_empty() {
            return Err(CommonError::config("LABELS_BUCKET cannot be empty"));
        }

        Ok(Self {
            storage: StorageConfig::from_env(),
            bucket,
        })
    }
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self> {
        load_dotenv();
        Self::from_env()
    }

    /// Build configuration from the current process environment
    pub fn from_env() -> Result<Self> {
        let login = LoginCredentials {
            username: env_or_default("WMS_USERNAME", ""),
            password: env_or_default("WMS_PASSWORD", ""),
            system_id: env_or_default("WMS_SYSTEM_ID", ""),
        };

        let mut wms = WmsConfig::new(env_or_default("WMS_BASE_URL", ""), login);
        wms.report_name = env_or_default("WMS_REPORT_NAME", DEFAULT_REPORT_NAME);
        wms.order_id_column = env_or_default("WMS_ORDER_ID_COLUMN", DEFAULT_ORDER_ID_COLUMN);
        wms.request_timeout = Duration::from_secs(parse_env(
            "WMS_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        wms.fetch_timeout =
            Duration::from_secs(parse_env("WMS_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?);
        wms.poll = PollPolicy {
            interval: Duration::from_secs(parse_env(
                "WMS_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            max_attempts: parse_env("WMS_POLL_MAX_ATTEMPTS", DEFAULT_POLL_MAX_ATTEMPTS)?,
        };

        let config = Config {
            wms,
            storage: StorageConfig::from_env(),
            alerts: AlertConfig {
                topic_arn: std::env::var("ALERT_TOPIC_ARN")
                    .ok()
                    .filter(|arn| !arn.trim().is_empty()),
            },
            bucket: labels_bucket(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.wms.validate()?;

        if self.bucket.trim().is_empty() {
            return Err(CommonError::config("LABELS_BUCKET cannot be empty"));
        }

        if self.alerts.topic_arn.is_none() {
            tracing::warn!("ALERT_TOPIC_ARN not set - alerts will only be logged");
        }

        Ok(())
    }
}

/// Read `.env` from the working directory or a parent. Variables already
/// set in the process environment win.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Ignoring unreadable .env: {}", e),
    }
}

fn labels_bucket() -> String {
    env_or_default("LABELS_BUCKET", DEFAULT_LABELS_BUCKET)
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            CommonError::config(format!("{} has an invalid value: '{}'", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const WMS_VARS: [&str; 9] = [
        "WMS_BASE_URL",
        "WMS_USERNAME",
        "WMS_PASSWORD",
        "WMS_SYSTEM_ID",
        "WMS_REPORT_NAME",
        "WMS_ORDER_ID_COLUMN",
        "WMS_POLL_MAX_ATTEMPTS",
        "WMS_POLL_INTERVAL_SECS",
        "LABELS_BUCKET",
    ];

    fn set_required_env() {
        for var in WMS_VARS {
            std::env::remove_var(var);
        }
        std::env::set_var("WMS_BASE_URL", "https://wms.example.com/api/");
        std::env::set_var("WMS_USERNAME", "labels");
        std::env::set_var("WMS_PASSWORD", "hunter2");
        std::env::set_var("WMS_SYSTEM_ID", "SYS1");
    }

    fn login() -> LoginCredentials {
        LoginCredentials {
            username: "labels".to_string(),
            password: "hunter2".to_string(),
            system_id: "SYS1".to_string(),
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        set_required_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.wms.base_url, "https://wms.example.com/api");
        assert_eq!(config.wms.report_name, DEFAULT_REPORT_NAME);
        assert_eq!(config.wms.order_id_column, DEFAULT_ORDER_ID_COLUMN);
        assert_eq!(config.wms.poll.max_attempts, 30);
        assert_eq!(config.wms.poll.interval, Duration::from_secs(2));
        assert_eq!(config.bucket, DEFAULT_LABELS_BUCKET);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        set_required_env();
        std::env::set_var("WMS_REPORT_NAME", "Unshipped Orders");
        std::env::set_var("WMS_POLL_MAX_ATTEMPTS", "10");
        std::env::set_var("LABELS_BUCKET", "labels-staging");

        let config = Config::from_env().unwrap();
        assert_eq!(config.wms.report_name, "Unshipped Orders");
        assert_eq!(config.wms.poll.max_attempts, 10);
        assert_eq!(config.bucket, "labels-staging");

        std::env::remove_var("WMS_REPORT_NAME");
        std::env::remove_var("WMS_POLL_MAX_ATTEMPTS");
        std::env::remove_var("LABELS_BUCKET");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_number() {
        set_required_env();
        std::env::set_var("WMS_POLL_INTERVAL_SECS", "soon");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("WMS_POLL_INTERVAL_SECS"));

        std::env::remove_var("WMS_POLL_INTERVAL_SECS");
    }

    #[test]
    #[serial]
    fn test_from_env_requires_credentials() {
        set_required_env();
        std::env::remove_var("WMS_PASSWORD");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("WMS_PASSWORD"));
    }

    #[test]
    #[serial]
    fn test_folder_config_reads_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "LABELS_BUCKET=labels-from-dotenv\nS3_ENDPOINT=http://localhost:9000\n",
        )
        .unwrap();
        std::env::remove_var("LABELS_BUCKET");
        std::env::remove_var("S3_ENDPOINT");
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let loaded = FolderConfig::load();

        std::env::set_current_dir(previous).unwrap();
        std::env::remove_var("LABELS_BUCKET");
        std::env::remove_var("S3_ENDPOINT");

        let config = loaded.unwrap();
        assert_eq!(config.bucket, "labels-from-dotenv");
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    #[serial]
    fn test_folder_config_rejects_blank_bucket() {
        std::env::set_var("LABELS_BUCKET", "  ");
        let err = FolderConfig::from_env().unwrap_err();
        std::env::remove_var("LABELS_BUCKET");

        assert!(err.to_string().contains("LABELS_BUCKET"));
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = WmsConfig::new("ftp://wms.example.com", login());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = WmsConfig::new("https://wms.example.com", login());
        config.poll.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = WmsConfig::new("https://wms.example.com", login());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
