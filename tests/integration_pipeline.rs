use async_trait::async_trait;
use influxdb_uploader::{
    error::Result, BrowserOpen, InfluxDbUploader, KpiSet, MetricSnapshot, MetricsStore,
    SendOutcome, SessionConfig, TimeSeriesRecord, UploaderError, UploaderSettings,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What the fake store answers to each write, in order. Once the script runs
/// out every write succeeds.
#[derive(Clone, Copy)]
enum Reply {
    Ok,
    NetworkDown,
    Reject,
}

#[derive(Default)]
struct Recorded {
    pings: usize,
    attempts: usize,
    written: Vec<Vec<TimeSeriesRecord>>,
    script: VecDeque<Reply>,
    config: Option<SessionConfig>,
}

#[derive(Clone, Default)]
struct ScriptedStore {
    state: Arc<Mutex<Recorded>>,
    refuse_ping: bool,
}

impl ScriptedStore {
    fn with_script(replies: &[Reply]) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().script = replies.iter().copied().collect();
        store
    }

    fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    fn written(&self) -> Vec<Vec<TimeSeriesRecord>> {
        self.state.lock().unwrap().written.clone()
    }
}

#[async_trait]
impl MetricsStore for ScriptedStore {
    async fn ping(&self) -> Result<()> {
        self.state.lock().unwrap().pings += 1;
        if self.refuse_ping {
            return Err(UploaderError::Connectivity("401 unauthorized".into()));
        }
        Ok(())
    }

    async fn write(&self, records: &[TimeSeriesRecord]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        match state.script.pop_front().unwrap_or(Reply::Ok) {
            Reply::Ok => {
                state.written.push(records.to_vec());
                Ok(())
            }
            Reply::NetworkDown => Err(UploaderError::Network("connection reset by peer".into())),
            Reply::Reject => Err(UploaderError::Remote {
                status: 400,
                message: "field type conflict".into(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn settings() -> UploaderSettings {
    UploaderSettings {
        browser_open: BrowserOpen::None,
        project: "pipeline-test".into(),
        influxdb_user: Some("loader".into()),
        influxdb_password: Some("secret".into()),
        influxdb_database: Some("loadtests".into()),
        send_interval: Duration::from_secs(30),
        timeout: Duration::from_secs(30),
        ..Default::default()
    }
}

fn kpis() -> KpiSet {
    let mut kpis = KpiSet {
        sample_count: 5,
        concurrency: 2,
        failures: 0,
        avg_resp_time: 0.4,
        ..Default::default()
    };
    kpis.percentiles.insert("0.0".into(), 0.1);
    kpis.percentiles.insert("100.0".into(), 0.9);
    kpis.resp_codes.insert("200".into(), 5);
    kpis
}

async fn running(store: ScriptedStore) -> InfluxDbUploader<ScriptedStore> {
    let mut uploader = InfluxDbUploader::new(settings());
    uploader
        .prepare_with(|_| None, move |_| Ok(store))
        .await
        .expect("prepare");
    uploader.startup().expect("startup");
    uploader
}

#[tokio::test]
async fn snapshots_are_shipped_once_interval_elapses() {
    let store = ScriptedStore::default();
    let mut uploader = running(store.clone()).await;
    let t0 = Instant::now();

    for ts in 1000..1003 {
        uploader
            .aggregated_second(MetricSnapshot::new(ts).with_label("", kpis()))
            .unwrap();
        let outcome = uploader
            .check_at(t0 + Duration::from_secs((ts - 1000) as u64))
            .await
            .unwrap();
        assert!(outcome.is_none(), "flushed before the send interval");
    }
    assert_eq!(store.attempts(), 0);

    let outcome = uploader
        .check_at(t0 + Duration::from_secs(31))
        .await
        .unwrap();
    assert_eq!(outcome, Some(SendOutcome::Delivered { attempts: 1 }));
    assert_eq!(uploader.buffered(), 0);

    let written = store.written();
    assert_eq!(written.len(), 1);
    // 3 snapshots x (6 fixed + 2 percentiles + 1 response code)
    assert_eq!(written[0].len(), 27);
    assert_eq!(written[0][0].time, "1970-01-01T00:16:40Z");
    assert!(written[0].iter().all(|r| r.tags["project"] == "pipeline-test"));
    assert!(written[0]
        .iter()
        .all(|r| r.tags["id"] == uploader.session_id()));
}

#[tokio::test]
async fn post_process_flushes_remaining_buffer() {
    let store = ScriptedStore::default();
    let mut uploader = running(store.clone()).await;

    uploader
        .aggregated_second(MetricSnapshot::new(50).with_label("login", kpis()))
        .unwrap();
    let outcome = uploader.post_process().await.unwrap();

    assert!(outcome.is_delivered());
    let written = store.written();
    assert_eq!(written.len(), 1);
    assert!(written[0].iter().all(|r| r.tags["label"] == "login"));
    assert_eq!(uploader.range().first(), Some(50));
}

#[tokio::test(start_paused = true)]
async fn repeated_network_failure_drops_batch_and_continues() {
    let store = ScriptedStore::with_script(&[Reply::NetworkDown, Reply::NetworkDown]);
    let mut uploader = running(store.clone()).await;
    let t0 = Instant::now();

    uploader
        .aggregated_second(MetricSnapshot::new(1).with_label("", kpis()))
        .unwrap();

    let paused = tokio::time::Instant::now();
    let outcome = uploader
        .check_at(t0 + Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(outcome, Some(SendOutcome::Dropped));
    assert_eq!(store.attempts(), 2);
    assert_eq!(paused.elapsed(), Duration::from_secs(30));
    assert_eq!(uploader.buffered(), 0);

    // The pipeline keeps going with the next batch.
    uploader
        .aggregated_second(MetricSnapshot::new(2).with_label("", kpis()))
        .unwrap();
    let outcome = uploader.post_process().await.unwrap();
    assert_eq!(outcome, SendOutcome::Delivered { attempts: 1 });
    assert_eq!(store.attempts(), 3);
    assert_eq!(store.written().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn single_network_failure_is_retried() {
    let store = ScriptedStore::with_script(&[Reply::NetworkDown]);
    let mut uploader = running(store.clone()).await;

    uploader
        .aggregated_second(MetricSnapshot::new(7).with_label("", kpis()))
        .unwrap();
    let outcome = uploader.post_process().await.unwrap();

    assert_eq!(outcome, SendOutcome::Delivered { attempts: 2 });
    assert_eq!(store.attempts(), 2);
    assert_eq!(store.written()[0].len(), 9);
}

#[tokio::test]
async fn rejected_write_does_not_stop_pipeline() {
    let store = ScriptedStore::with_script(&[Reply::Reject]);
    let mut uploader = running(store.clone()).await;
    let t0 = Instant::now();

    uploader
        .aggregated_second(MetricSnapshot::new(1).with_label("", kpis()))
        .unwrap();
    let outcome = uploader
        .check_at(t0 + Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(outcome, Some(SendOutcome::Rejected));
    assert_eq!(store.attempts(), 1);

    uploader
        .aggregated_second(MetricSnapshot::new(2).with_label("", kpis()))
        .unwrap();
    let outcome = uploader
        .check_at(t0 + Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(outcome, Some(SendOutcome::Delivered { attempts: 1 }));
}

#[tokio::test]
async fn missing_credentials_fail_before_connecting() {
    let mut s = settings();
    s.influxdb_user = None;
    s.influxdb_password = None;
    let store = ScriptedStore::default();
    let mut uploader = InfluxDbUploader::new(s);

    let connected = Arc::new(Mutex::new(false));
    let flag = connected.clone();
    let err = uploader
        .prepare_with(
            |_| None,
            move |_| {
                *flag.lock().unwrap() = true;
                Ok(store)
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploaderError::Configuration(_)));
    assert!(!*connected.lock().unwrap());
}

#[tokio::test]
async fn environment_credentials_reach_the_session() {
    let mut s = settings();
    s.influxdb_user = None;
    s.influxdb_password = None;
    let store = ScriptedStore::default();
    let seen = store.clone();
    let mut uploader = InfluxDbUploader::new(s);

    uploader
        .prepare_with(
            |key| match key {
                "INFLUXDB_USER" => Some("env-user".to_string()),
                "INFLUXDB_PASSWORD" => Some("env-pass".to_string()),
                _ => None,
            },
            move |config| {
                store.state.lock().unwrap().config = Some(config);
                Ok(store)
            },
        )
        .await
        .unwrap();

    let state = seen.state.lock().unwrap();
    let config = state.config.as_ref().unwrap();
    assert_eq!(config.user, "env-user");
    assert_eq!(config.password, "env-pass");
    assert_eq!(config.database, "loadtests");
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(state.pings, 1);
}

#[tokio::test]
async fn failed_ping_aborts_startup() {
    let store = ScriptedStore {
        refuse_ping: true,
        ..Default::default()
    };
    let mut uploader = InfluxDbUploader::new(settings());

    let err = uploader
        .prepare_with(|_| None, move |_| Ok(store))
        .await
        .unwrap_err();

    assert!(matches!(err, UploaderError::Connectivity(_)));
    assert_eq!(
        uploader.state(),
        influxdb_uploader::UploaderState::Uninitialized
    );
    assert!(uploader.startup().is_err());
}
