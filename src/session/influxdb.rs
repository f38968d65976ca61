//! InfluxDB 1.x HTTP session.
//!
//! Uses the `/ping` and `/write` endpoints with HTTP basic authentication.
//! Points are written in line protocol with second precision.

use super::{MetricsStore, SessionConfig};
use crate::error::{Result, UploaderError};
use crate::serializer::{encode_batch, TimeSeriesRecord};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

/// Longest server error body we keep in an error message.
const ERROR_BODY_LIMIT: usize = 256;

/// HTTP session against one InfluxDB database.
pub struct InfluxDbSession {
    config: SessionConfig,
    client: Client,
    ping_url: Url,
    write_url: Url,
}

impl InfluxDbSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let base = config.base_url()?;
        let ping_url = join(&base, "ping")?;
        let mut write_url = join(&base, "write")?;
        write_url
            .query_pairs_mut()
            .append_pair("db", &config.database)
            .append_pair("precision", "s");

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UploaderError::Configuration(format!("HTTP client: {}", e)))?;

        debug!("InfluxDB session for {:?}", config);
        Ok(Self {
            config,
            client,
            ping_url,
            write_url,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

/// Append `endpoint` under the base path, keeping any proxy prefix.
fn join(base: &Url, endpoint: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| {
            UploaderError::Configuration(format!("{} endpoint: '{}' has no path", endpoint, base))
        })?
        .pop_if_empty()
        .push(endpoint);
    Ok(url)
}

fn truncate(mut body: String) -> String {
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

#[async_trait]
impl MetricsStore for InfluxDbSession {
    async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(self.ping_url.clone())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| UploaderError::Connectivity(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UploaderError::Connectivity(
                format!("authentication rejected for user '{}'", self.config.user),
            )),
            status if status.is_success() => {
                let version = response
                    .headers()
                    .get("X-Influxdb-Version")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                debug!("InfluxDB ping ok, server version {}", version);
                Ok(())
            }
            status => Err(UploaderError::Connectivity(format!(
                "ping returned HTTP {}",
                status
            ))),
        }
    }

    async fn write(&self, records: &[TimeSeriesRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let body = encode_batch(records)?;

        let response = self
            .client
            .post(self.write_url.clone())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .body(body)
            .send()
            .await
            .map_err(UploaderError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            debug!("Wrote {} records to {}", records.len(), self.config.database);
            return Ok(());
        }

        let message = response
            .text()
            .await
            .map(truncate)
            .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
        Err(UploaderError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    fn name(&self) -> &'static str {
        "InfluxDB"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session() -> InfluxDbSession {
        InfluxDbSession::new(SessionConfig {
            address: "localhost".to_string(),
            port: 8086,
            user: "u".to_string(),
            password: "p".to_string(),
            database: "load tests".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoints() {
        let session = session();
        assert_eq!(session.ping_url.as_str(), "http://localhost:8086/ping");
        assert_eq!(
            session.write_url().as_str(),
            "http://localhost:8086/write?db=load+tests&precision=s"
        );
    }

    #[test]
    fn test_endpoints_keep_path_prefix() {
        let session = InfluxDbSession::new(SessionConfig {
            address: "https://proxy.example.com/influx/".to_string(),
            port: 443,
            user: "u".to_string(),
            password: "p".to_string(),
            database: "db".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(session.ping_url.as_str(), "https://proxy.example.com/influx/ping");
        assert_eq!(
            session.write_url().as_str(),
            "https://proxy.example.com/influx/write?db=db&precision=s"
        );
    }

    #[test]
    fn test_truncate_long_bodies() {
        let short = truncate("oops".to_string());
        assert_eq!(short, "oops");

        let long = truncate("é".repeat(300));
        assert!(long.ends_with("..."));
        assert!(long.len() <= ERROR_BODY_LIMIT + 3);
    }

    #[tokio::test]
    async fn test_empty_write_sends_nothing() {
        // Nothing listens on this port; an actual request would fail.
        let session = InfluxDbSession::new(SessionConfig {
            address: "127.0.0.1".to_string(),
            port: 9,
            user: "u".to_string(),
            password: "p".to_string(),
            database: "db".to_string(),
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        session.write(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_ping_is_connectivity_error() {
        let session = InfluxDbSession::new(SessionConfig {
            address: "127.0.0.1".to_string(),
            port: 9,
            user: "u".to_string(),
            password: "p".to_string(),
            database: "db".to_string(),
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        let err = session.ping().await.unwrap_err();
        assert!(matches!(err, UploaderError::Connectivity(_)));
    }
}
