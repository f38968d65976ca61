use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Percentile identifier of the fastest sample, reported as `min`.
pub const PERCENTILE_MIN: &str = "0.0";

/// Percentile identifier of the slowest sample, reported as `max`.
pub const PERCENTILE_MAX: &str = "100.0";

/// Counters and distributions for one label within one interval.
///
/// Response times are in seconds; the serializer scales them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSet {
    pub sample_count: u64,
    pub concurrency: u64,
    pub failures: u64,
    /// Percentile id ("0.0".."100.0") to response time.
    #[serde(default)]
    pub percentiles: BTreeMap<String, f64>,
    pub avg_resp_time: f64,
    /// Response code to occurrence count.
    #[serde(default)]
    pub resp_codes: BTreeMap<String, u64>,
}

impl KpiSet {
    /// Scaled response time for a percentile, or 0 if the engine omitted it.
    pub fn scaled_percentile(&self, id: &str, multiplier: u64) -> i64 {
        self.percentiles
            .get(id)
            .map(|&rt| scale(rt, multiplier))
            .unwrap_or(0)
    }
}

/// Convert a sub-second response time into integer units.
pub fn scale(response_time: f64, multiplier: u64) -> i64 {
    (response_time * multiplier as f64).round() as i64
}

/// One aggregated measurement interval as delivered by the host engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Epoch seconds.
    pub timestamp: i64,
    /// Label to KPIs. The empty label is the overall aggregate.
    #[serde(default)]
    pub current: BTreeMap<String, KpiSet>,
}

impl MetricSnapshot {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            current: BTreeMap::new(),
        }
    }

    /// Builder-style helper used by drivers and tests.
    pub fn with_label(mut self, label: impl Into<String>, kpis: KpiSet) -> Self {
        self.current.insert(label.into(), kpis);
        self
    }
}

/// First and last timestamp across every snapshot ever buffered.
///
/// Only ever widens; there is no reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimestampRange {
    first: Option<i64>,
    last: Option<i64>,
}

impl TimestampRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, timestamp: i64) {
        self.first = Some(self.first.map_or(timestamp, |f| f.min(timestamp)));
        self.last = Some(self.last.map_or(timestamp, |l| l.max(timestamp)));
    }

    /// Widen with a whole batch, using its true min and max.
    pub fn observe_batch(&mut self, snapshots: &[MetricSnapshot]) {
        for snapshot in snapshots {
            self.observe(snapshot.timestamp);
        }
    }

    pub fn first(&self) -> Option<i64> {
        self.first
    }

    pub fn last(&self) -> Option<i64> {
        self.last
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        match (self.first, self.last) {
            (Some(f), Some(l)) => f <= timestamp && timestamp <= l,
            _ => false,
        }
    }

    /// Covered span in seconds, if anything was observed.
    pub fn span_secs(&self) -> Option<i64> {
        Some(self.last? - self.first?)
    }
}
