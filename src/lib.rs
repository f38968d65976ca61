//! # InfluxDB Uploader Library
//!
//! Ships per-second aggregated performance-test metrics from a test
//! execution engine to InfluxDB as tagged time-series points.
//!
//! ## Pipeline
//!
//! ```text
//! host engine -> buffer (append) -> scheduler (interval) -> serializer
//!             -> retry sender -> session -> InfluxDB
//! ```
//!
//! Delivery is best effort. A batch that fails with a network problem is
//! retried once after the configured timeout and then dropped; the test run
//! never fails because of an upload.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use influxdb_uploader::{InfluxDbUploader, KpiSet, MetricSnapshot, UploaderSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = UploaderSettings::from_json_str(
//!         r#"{"influxdb-database": "loadtests", "browser-open": "none"}"#,
//!     )?;
//!     let mut uploader: InfluxDbUploader = InfluxDbUploader::new(settings);
//!     uploader.prepare().await?;
//!     uploader.startup()?;
//!
//!     let kpis = KpiSet { sample_count: 10, concurrency: 2, ..Default::default() };
//!     uploader.aggregated_second(MetricSnapshot::new(1_700_000_000).with_label("", kpis))?;
//!     uploader.check().await?;
//!
//!     uploader.post_process().await?;
//!     Ok(())
//! }
//! ```

/// Command-line interface for the replay driver
pub mod cli;

/// Uploader settings, browser options and credential resolution
pub mod config;

/// Buffer and interval-based dispatch scheduling
pub mod dispatch;

/// Error taxonomy shared by every pipeline stage
pub mod error;

pub mod logging;

/// Snapshot data model and running timestamp extrema
pub mod metrics;

/// Single-shot retry policy around the write path
pub mod retry;

/// Snapshot-to-record transformation and line protocol output
pub mod serializer;

/// Metrics store sessions
///
/// Contains the `MetricsStore` trait and the InfluxDB HTTP implementation.
pub mod session;

/// Lifecycle-driven pipeline object
pub mod uploader;

pub mod utils;

pub use config::{BrowserOpen, UploaderSettings};
pub use error::UploaderError;
pub use metrics::{KpiSet, MetricSnapshot, TimestampRange};
pub use retry::{RetryPolicy, RetrySender, SendOutcome};
pub use serializer::{DatapointSerializer, FieldValue, TimeSeriesRecord};
pub use session::{InfluxDbSession, MetricsStore, SessionConfig};
pub use uploader::{InfluxDbUploader, UploaderState};

/// The current version of the uploader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// How often buffered snapshots are shipped.
    pub const SEND_INTERVAL: Duration = Duration::from_secs(30);

    /// Transport timeout and retry delay.
    pub const TIMEOUT: Duration = Duration::from_secs(30);

    /// Seconds to milliseconds.
    pub const REPORT_TIMES_MULTIPLIER: u64 = crate::serializer::DEFAULT_MULTIPLIER;

    pub const PROJECT: &str = "myproject";

    pub const INFLUXDB_ADDRESS: &str = "localhost";

    pub const INFLUXDB_PORT: u16 = 8086;
}
