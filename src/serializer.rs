//! Snapshot-to-record serialization and InfluxDB line protocol rendering.
//!
//! Each `(label, KpiSet)` pair of a snapshot expands into a fixed block of
//! records:
//!
//! ```text
//! RPS, Threads, Failures, min, max, avg     one each
//! p<percentile-id>                          one per percentile entry
//! rc  (tagged rc=<code>)                    one per response code
//! ```
//!
//! Line protocol output follows
//! <https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/>.

use crate::error::{Result, UploaderError};
use crate::metrics::{scale, KpiSet, MetricSnapshot, TimestampRange, PERCENTILE_MAX, PERCENTILE_MIN};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Tag set attached to a record. Sorted, so line protocol output is canonical.
pub type Tags = BTreeMap<String, String>;

/// Timestamp layout used in every record.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Label tag value used for the empty (overall) label.
pub const OVERALL_LABEL: &str = "OVERALL";

/// Measurement name for response-code counters.
pub const RESPONSE_CODE_MEASUREMENT: &str = "rc";

/// Default factor converting seconds into reported integer units (ms).
pub const DEFAULT_MULTIPLIER: u64 = 1000;

/// A numeric value stored in the record's `value` field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            FieldValue::Integer(v) => v as f64,
            FieldValue::Float(v) => v,
        }
    }

    /// Integers carry the `i` suffix so InfluxDB stores them as int64.
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::Float(v) => format!("{}", v),
        }
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

/// One point in the uploaded series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesRecord {
    pub measurement: String,
    pub tags: Tags,
    /// ISO-8601 UTC, second precision.
    pub time: String,
    pub value: FieldValue,
}

impl TimeSeriesRecord {
    pub fn new(
        measurement: impl Into<String>,
        tags: Tags,
        time: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tags,
            time: time.into(),
            value: value.into(),
        }
    }

    /// Epoch seconds parsed back from `time`.
    pub fn epoch_seconds(&self) -> Result<i64> {
        NaiveDateTime::parse_from_str(&self.time, TIME_FORMAT)
            .map(|dt| dt.and_utc().timestamp())
            .map_err(|e| {
                UploaderError::Internal(format!(
                    "record '{}' has malformed time '{}': {}",
                    self.measurement, self.time, e
                ))
            })
    }

    /// Render as one line of InfluxDB line protocol with second precision.
    pub fn to_line_protocol(&self) -> Result<String> {
        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            // InfluxDB rejects empty tag values; drop them instead.
            if value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }
        line.push_str(" value=");
        line.push_str(&self.value.to_line_protocol());
        line.push(' ');
        line.push_str(&self.epoch_seconds()?.to_string());
        Ok(line)
    }
}

/// Render a batch as a newline-separated line protocol body.
pub fn encode_batch(records: &[TimeSeriesRecord]) -> Result<String> {
    let lines = records
        .iter()
        .map(TimeSeriesRecord::to_line_protocol)
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

// Line protocol has no escape for line breaks; they become spaces.
fn flatten_line_breaks(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

fn escape_measurement(s: &str) -> String {
    flatten_line_breaks(s)
        .replace(',', "\\,")
        .replace(' ', "\\ ")
}

fn escape_tag(s: &str) -> String {
    flatten_line_breaks(s)
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Format epoch seconds the way every record carries its time.
pub fn format_timestamp(epoch_seconds: i64) -> Result<String> {
    DateTime::<Utc>::from_timestamp(epoch_seconds, 0)
        .map(|dt| dt.format(TIME_FORMAT).to_string())
        .ok_or_else(|| {
            UploaderError::Internal(format!("timestamp {} out of range", epoch_seconds))
        })
}

/// Converts aggregated snapshots into time-series records.
#[derive(Debug, Clone)]
pub struct DatapointSerializer {
    multiplier: u64,
}

impl DatapointSerializer {
    pub fn new(multiplier: u64) -> Self {
        Self { multiplier }
    }

    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    /// Serialize a batch of snapshots.
    ///
    /// `range` is widened with the batch. The caller is responsible for
    /// passing snapshots in time order; the order is not validated.
    pub fn serialize(
        &self,
        snapshots: &[MetricSnapshot],
        base_tags: &Tags,
        is_final: bool,
        range: &mut TimestampRange,
    ) -> Result<Vec<TimeSeriesRecord>> {
        let mut records = Vec::new();
        if snapshots.is_empty() {
            return Ok(records);
        }

        range.observe_batch(snapshots);

        for snapshot in snapshots {
            let time = format_timestamp(snapshot.timestamp)?;
            for (label, kpis) in &snapshot.current {
                let mut tags = base_tags.clone();
                let label = if label.is_empty() {
                    OVERALL_LABEL
                } else {
                    label.as_str()
                };
                tags.insert("label".to_string(), label.to_string());
                self.convert_kpis(kpis, &time, &tags, &mut records);
            }
        }

        debug!(
            "Serialized {} snapshots into {} records (final: {})",
            snapshots.len(),
            records.len(),
            is_final
        );
        Ok(records)
    }

    fn convert_kpis(
        &self,
        kpis: &KpiSet,
        time: &str,
        tags: &Tags,
        out: &mut Vec<TimeSeriesRecord>,
    ) {
        let multi = self.multiplier;
        let tmin = kpis.scaled_percentile(PERCENTILE_MIN, multi);
        let tmax = kpis.scaled_percentile(PERCENTILE_MAX, multi);
        let tavg = kpis.avg_resp_time * multi as f64;

        let fixed: [(&str, FieldValue); 6] = [
            ("RPS", kpis.sample_count.into()),
            ("Threads", kpis.concurrency.into()),
            ("Failures", kpis.failures.into()),
            ("min", tmin.into()),
            ("max", tmax.into()),
            ("avg", tavg.into()),
        ];
        for (measurement, value) in fixed {
            out.push(TimeSeriesRecord::new(measurement, tags.clone(), time, value));
        }

        let mut percentiles: Vec<(&String, f64)> =
            kpis.percentiles.iter().map(|(id, &rt)| (id, rt)).collect();
        percentiles.sort_by(|a, b| percentile_rank(a.0).total_cmp(&percentile_rank(b.0)));
        for (id, rt) in percentiles {
            out.push(TimeSeriesRecord::new(
                format!("p{}", id),
                tags.clone(),
                time,
                scale(rt, multi),
            ));
        }

        for (code, &count) in &kpis.resp_codes {
            let mut rc_tags = tags.clone();
            rc_tags.insert(RESPONSE_CODE_MEASUREMENT.to_string(), code.clone());
            out.push(TimeSeriesRecord::new(
                RESPONSE_CODE_MEASUREMENT,
                rc_tags,
                time,
                count,
            ));
        }
    }
}

/// Numeric position of a percentile id; ids that are not numbers sort last.
fn percentile_rank(id: &str) -> f64 {
    id.parse().unwrap_or(f64::INFINITY)
}

impl Default for DatapointSerializer {
    fn default() -> Self {
        Self::new(DEFAULT_MULTIPLIER)
    }
}
