use crate::error::{Result, UploaderError};
use crate::serializer::TimeSeriesRecord;
use async_trait::async_trait;
use reqwest::Url;
use std::fmt;
use std::time::Duration;

pub mod influxdb;

pub use influxdb::InfluxDbSession;

/// Connection settings for a metrics store session.
#[derive(Clone)]
pub struct SessionConfig {
    pub address: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Transport timeout, also used as the retry delay.
    pub timeout: Duration,
}

impl SessionConfig {
    /// Base URL of the HTTP API. A bare host name gets an `http://` scheme.
    pub fn base_url(&self) -> Result<Url> {
        let address = self.address.trim_end_matches('/');
        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let mut url = Url::parse(&with_scheme).map_err(|e| {
            UploaderError::Configuration(format!(
                "invalid influxdb-address '{}': {}",
                self.address, e
            ))
        })?;
        url.set_port(Some(self.port)).map_err(|_| {
            UploaderError::Configuration(format!(
                "influxdb-address '{}' cannot carry a port",
                self.address
            ))
        })?;
        Ok(url)
    }
}

// Hand-written so the password never reaches the logs.
impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A remote time-series store the pipeline can ship records to.
///
/// Implementations are thin, fail-fast transport boundaries: no retries,
/// no buffering.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Liveness and authentication check, used once at startup.
    ///
    /// Fails with `UploaderError::Connectivity`.
    async fn ping(&self) -> Result<()>;

    /// Write one batch of records.
    ///
    /// Fails with `UploaderError::Network` on transport failure and
    /// `UploaderError::Remote` when the store rejects the batch.
    async fn write(&self, records: &[TimeSeriesRecord]) -> Result<()>;

    /// Store name for logging.
    fn name(&self) -> &'static str;
}
