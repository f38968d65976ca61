//! # Uploader Lifecycle
//!
//! `InfluxDbUploader` is the pipeline object the host engine drives. It has
//! no timer or worker of its own; every operation runs on the caller's task
//! and is awaited to completion, including the retry delay.
//!
//! ## State Machine
//!
//! ```text
//! Uninitialized --prepare--> Ready --startup--> Running --post_process--> Stopped
//!                              \______________post_process______________/
//! ```
//!
//! - `prepare`: validate settings, resolve credentials, ping the store
//! - `startup`: compute the dashboard link, optionally open it
//! - `check`: poll; ships the buffer once the send interval has elapsed
//! - `aggregated_second`: data delivery, once per completed interval
//! - `post_process`: final flush of everything still buffered

use crate::config::UploaderSettings;
use crate::dispatch::DispatchScheduler;
use crate::error::{Result, UploaderError};
use crate::metrics::{MetricSnapshot, TimestampRange};
use crate::retry::{RetryPolicy, RetrySender, SendOutcome};
use crate::serializer::{format_timestamp, DatapointSerializer, Tags};
use crate::session::{InfluxDbSession, MetricsStore, SessionConfig};
use crate::utils::{generate_session_id, open_browser};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info};

/// Lifecycle states of the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploaderState {
    Uninitialized,
    Ready,
    Running,
    Stopped,
}

impl UploaderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploaderState::Uninitialized => "Uninitialized",
            UploaderState::Ready => "Ready",
            UploaderState::Running => "Running",
            UploaderState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for UploaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything that only exists once `prepare` has succeeded.
struct Pipeline<S> {
    sender: RetrySender<S>,
    scheduler: DispatchScheduler,
    base_tags: Tags,
}

/// Streams aggregated test metrics to a metrics store.
pub struct InfluxDbUploader<S = InfluxDbSession> {
    settings: UploaderSettings,
    state: UploaderState,
    session_id: String,
    serializer: DatapointSerializer,
    range: TimestampRange,
    results_url: Option<String>,
    pipeline: Option<Pipeline<S>>,
}

impl<S: MetricsStore> InfluxDbUploader<S> {
    pub fn new(settings: UploaderSettings) -> Self {
        let serializer = DatapointSerializer::new(settings.report_times_multiplier);
        Self {
            settings,
            state: UploaderState::Uninitialized,
            session_id: generate_session_id(),
            serializer,
            range: TimestampRange::new(),
            results_url: None,
            pipeline: None,
        }
    }

    pub fn state(&self) -> UploaderState {
        self.state
    }

    pub fn settings(&self) -> &UploaderSettings {
        &self.settings
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Covered time range of every snapshot delivered so far.
    pub fn range(&self) -> TimestampRange {
        self.range
    }

    pub fn results_url(&self) -> Option<&str> {
        self.results_url.as_deref()
    }

    /// Tags merged into every record. Empty before `prepare`.
    pub fn base_tags(&self) -> Tags {
        self.pipeline
            .as_ref()
            .map(|p| p.base_tags.clone())
            .unwrap_or_default()
    }

    /// Number of snapshots waiting for the next dispatch.
    pub fn buffered(&self) -> usize {
        self.pipeline.as_ref().map_or(0, |p| p.scheduler.len())
    }

    pub fn store(&self) -> Option<&S> {
        self.pipeline.as_ref().map(|p| p.sender.store())
    }

    /// Validate settings, resolve credentials, connect and ping.
    ///
    /// `lookup` resolves environment variables; `connect` builds the store
    /// from the resolved session config. Any failure leaves the uploader
    /// `Uninitialized`.
    pub async fn prepare_with<L, C>(&mut self, lookup: L, connect: C) -> Result<()>
    where
        L: Fn(&str) -> Option<String>,
        C: FnOnce(SessionConfig) -> Result<S>,
    {
        self.expect_state("prepare", &[UploaderState::Uninitialized])?;

        self.settings.validate()?;
        let credentials = self.settings.resolve_credentials(lookup)?;
        let database = self
            .settings
            .database()
            .map(str::to_string)
            .ok_or_else(|| UploaderError::Configuration("influxdb-database is required".into()))?;

        let mut base_tags = Tags::new();
        base_tags.insert("project".to_string(), self.settings.project.clone());
        base_tags.insert("id".to_string(), self.session_id.clone());
        base_tags.extend(self.settings.custom_tags.clone());

        let config = SessionConfig {
            address: self.settings.influxdb_address.clone(),
            port: self.settings.influxdb_port,
            user: credentials.user,
            password: credentials.password,
            database,
            timeout: self.settings.timeout,
        };
        let store = connect(config)?;

        if let Err(e) = store.ping().await {
            error!("Cannot reach {}", store.name());
            return Err(match e {
                UploaderError::Connectivity(_) => e,
                other => UploaderError::Connectivity(other.to_string()),
            });
        }

        self.pipeline = Some(Pipeline {
            sender: RetrySender::new(store, RetryPolicy::new(self.settings.timeout)),
            scheduler: DispatchScheduler::new(self.settings.send_interval, Instant::now()),
            base_tags,
        });
        self.state = UploaderState::Ready;
        info!(
            "Uploader ready: project={}, id={}, send interval {:?}",
            self.settings.project, self.session_id, self.settings.send_interval
        );
        Ok(())
    }

    /// Compute and announce the dashboard link.
    pub fn startup(&mut self) -> Result<()> {
        self.expect_state("startup", &[UploaderState::Ready])?;

        let url = self.dashboard_url();
        info!("Started data feeding: {}", url);
        if self.settings.browser_open.at_start() {
            open_browser(&url);
        }
        self.results_url = Some(url);
        self.state = UploaderState::Running;
        Ok(())
    }

    /// Dashboard link filtered to this project and session.
    pub fn dashboard_url(&self) -> String {
        format!(
            "{}?startTime=-15m&endTime=Now&sources%5B%5D=project:{}&sources%5B%5D=id:{}&density=4",
            self.settings.dashboard_url.trim_end_matches('/'),
            self.settings.project,
            self.session_id
        )
    }

    /// Data delivery from the host engine, one call per completed interval.
    pub fn aggregated_second(&mut self, snapshot: MetricSnapshot) -> Result<()> {
        self.expect_state(
            "accept data",
            &[UploaderState::Ready, UploaderState::Running],
        )?;
        self.range.observe(snapshot.timestamp);
        self.pipeline_mut()?.scheduler.append(snapshot);
        Ok(())
    }

    /// Periodic poll from the host engine.
    pub async fn check(&mut self) -> Result<Option<SendOutcome>> {
        self.check_at(Instant::now()).await
    }

    /// `check` against an explicit clock reading.
    pub async fn check_at(&mut self, now: Instant) -> Result<Option<SendOutcome>> {
        self.expect_state("check", &[UploaderState::Running])?;

        let batch = match self.pipeline_mut()?.scheduler.tick(now) {
            Some(batch) => batch,
            None => return Ok(None),
        };
        self.send_data(&batch, false).await.map(Some)
    }

    /// Final flush of everything still buffered, regardless of interval.
    pub async fn post_process(&mut self) -> Result<SendOutcome> {
        self.expect_state(
            "post-process",
            &[UploaderState::Ready, UploaderState::Running],
        )?;

        let batch = self.pipeline_mut()?.scheduler.flush_all();
        info!("Sending remaining KPI data to server...");
        let outcome = self.send_data(&batch, true).await;
        self.state = UploaderState::Stopped;

        let url = self
            .results_url
            .clone()
            .unwrap_or_else(|| self.dashboard_url());
        if self.settings.browser_open.at_end() {
            open_browser(&url);
        }
        info!("Report link: {}", url);
        self.log_covered_range();

        outcome
    }

    async fn send_data(&mut self, batch: &[MetricSnapshot], is_final: bool) -> Result<SendOutcome> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or(UploaderError::InvalidState {
                operation: "send data",
                state: self.state.as_str(),
            })?;

        let records =
            self.serializer
                .serialize(batch, &pipeline.base_tags, is_final, &mut self.range)?;
        let outcome = pipeline.sender.send(&records).await?;
        debug!(
            "Dispatched {} snapshots ({} records): {:?}",
            batch.len(),
            records.len(),
            outcome
        );
        Ok(outcome)
    }

    fn log_covered_range(&self) {
        let (Some(first), Some(last)) = (self.range.first(), self.range.last()) else {
            info!("No KPI data was delivered");
            return;
        };
        match (format_timestamp(first), format_timestamp(last)) {
            (Ok(from), Ok(to)) => info!("Uploaded data covers {} .. {}", from, to),
            _ => info!("Uploaded data covers epoch {} .. {}", first, last),
        }
    }

    fn pipeline_mut(&mut self) -> Result<&mut Pipeline<S>> {
        let state = self.state.as_str();
        self.pipeline.as_mut().ok_or(UploaderError::InvalidState {
            operation: "use pipeline",
            state,
        })
    }

    fn expect_state(&self, operation: &'static str, allowed: &[UploaderState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(UploaderError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }
}

impl InfluxDbUploader<InfluxDbSession> {
    /// `prepare_with` against a real InfluxDB, reading credentials from the
    /// process environment.
    pub async fn prepare(&mut self) -> Result<()> {
        self.prepare_with(|key| std::env::var(key).ok(), InfluxDbSession::new)
            .await
    }
}
