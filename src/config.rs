//! Uploader settings and credential resolution.
//!
//! Settings are read from JSON using the same kebab-case keys the host
//! engine's configuration uses:
//!
//! ```json
//! {
//!   "send-interval": "30s",
//!   "browser-open": "none",
//!   "project": "checkout-service",
//!   "custom-tags": {"env": "staging"},
//!   "influxdb-address": "influx.internal",
//!   "influxdb-database": "loadtests"
//! }
//! ```

use crate::error::{Result, UploaderError};
use crate::serializer::Tags;
use crate::utils::deserialize_duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Environment variable consulted when the settings carry no user.
pub const ENV_USER: &str = "INFLUXDB_USER";

/// Environment variable consulted when the settings carry no password.
pub const ENV_PASSWORD: &str = "INFLUXDB_PASSWORD";

pub const DEFAULT_DASHBOARD_URL: &str = "https://<REALM>.signalfx.com/#/dashboard/<ID>";

/// When to open the dashboard link in a browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserOpen {
    #[default]
    Start,
    End,
    Both,
    None,
}

impl BrowserOpen {
    pub fn at_start(self) -> bool {
        matches!(self, BrowserOpen::Start | BrowserOpen::Both)
    }

    pub fn at_end(self) -> bool {
        matches!(self, BrowserOpen::End | BrowserOpen::Both)
    }
}

impl FromStr for BrowserOpen {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(BrowserOpen::Start),
            "end" => Ok(BrowserOpen::End),
            "both" => Ok(BrowserOpen::Both),
            "none" | "false" => Ok(BrowserOpen::None),
            other => Err(format!(
                "invalid browser-open '{}', expected start, end, both or none",
                other
            )),
        }
    }
}

impl fmt::Display for BrowserOpen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BrowserOpen::Start => "start",
            BrowserOpen::End => "end",
            BrowserOpen::Both => "both",
            BrowserOpen::None => "none",
        };
        write!(f, "{}", name)
    }
}

/// Recognized uploader options.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct UploaderSettings {
    #[serde(deserialize_with = "deserialize_duration")]
    pub send_interval: Duration,
    pub browser_open: BrowserOpen,
    pub project: String,
    pub custom_tags: Tags,
    pub report_times_multiplier: u64,
    pub influxdb_address: String,
    pub influxdb_port: u16,
    pub influxdb_user: Option<String>,
    pub influxdb_password: Option<String>,
    pub influxdb_database: Option<String>,
    pub dashboard_url: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            send_interval: crate::defaults::SEND_INTERVAL,
            browser_open: BrowserOpen::default(),
            project: crate::defaults::PROJECT.to_string(),
            custom_tags: Tags::new(),
            report_times_multiplier: crate::defaults::REPORT_TIMES_MULTIPLIER,
            influxdb_address: crate::defaults::INFLUXDB_ADDRESS.to_string(),
            influxdb_port: crate::defaults::INFLUXDB_PORT,
            influxdb_user: None,
            influxdb_password: None,
            influxdb_database: None,
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
            timeout: crate::defaults::TIMEOUT,
        }
    }
}

impl fmt::Debug for UploaderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploaderSettings")
            .field("send_interval", &self.send_interval)
            .field("browser_open", &self.browser_open)
            .field("project", &self.project)
            .field("custom_tags", &self.custom_tags)
            .field("report_times_multiplier", &self.report_times_multiplier)
            .field("influxdb_address", &self.influxdb_address)
            .field("influxdb_port", &self.influxdb_port)
            .field("influxdb_user", &self.influxdb_user)
            .field(
                "influxdb_password",
                &self.influxdb_password.as_ref().map(|_| "***"),
            )
            .field("influxdb_database", &self.influxdb_database)
            .field("dashboard_url", &self.dashboard_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl UploaderSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| UploaderError::Configuration(format!("invalid settings: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UploaderError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Sanity checks run before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.report_times_multiplier == 0 {
            return Err(UploaderError::Configuration(
                "report-times-multiplier must be positive".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(UploaderError::Configuration(
                "timeout must be positive".to_string(),
            ));
        }
        if self.influxdb_address.trim().is_empty() {
            return Err(UploaderError::Configuration(
                "influxdb-address must not be empty".to_string(),
            ));
        }
        if self.database().is_none() {
            return Err(UploaderError::Configuration(
                "influxdb-database is required".to_string(),
            ));
        }
        if self.custom_tags.contains_key("label") {
            return Err(UploaderError::Configuration(
                "custom-tags must not override 'label'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database(&self) -> Option<&str> {
        self.influxdb_database
            .as_deref()
            .map(str::trim)
            .filter(|db| !db.is_empty())
    }

    /// Resolve credentials from the settings first, then from `lookup`
    /// (normally the process environment).
    pub fn resolve_credentials<F>(&self, lookup: F) -> Result<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let (Some(user), Some(password)) = (
            non_empty(self.influxdb_user.as_deref()),
            non_empty(self.influxdb_password.as_deref()),
        ) {
            info!("Credentials found in config file");
            return Ok(Credentials {
                user: user.to_string(),
                password: password.to_string(),
            });
        }
        info!("Credentials not found in config file");

        let user = lookup(ENV_USER).filter(|v| !v.is_empty());
        let password = lookup(ENV_PASSWORD).filter(|v| !v.is_empty());
        match (user, password) {
            (Some(user), Some(password)) => {
                info!("InfluxDB credentials found in environment variables");
                Ok(Credentials { user, password })
            }
            _ => {
                info!("InfluxDB credentials not found in environment variables");
                Err(UploaderError::Configuration(
                    "No InfluxDB credentials provided".to_string(),
                ))
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Resolved InfluxDB user and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}
