//! # Utility Functions
//!
//! Small helpers shared by the settings loader, the CLI and the uploader:
//!
//! - **Durations**: parsing human-readable durations ("30s", "5m", "500ms")
//!   and accepting either that form or plain seconds in settings files
//! - **Session ids**: short unique ids used to tag every uploaded record
//! - **Browser**: opening the dashboard link on the local desktop

use serde::{Deserialize, Deserializer};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Generate a short session id for the `id` tag.
///
/// Uses the last group of a UUID v4 (12 hex characters), which is unique
/// enough to tell concurrent test runs apart on one dashboard.
pub fn generate_session_id() -> String {
    let id = Uuid::new_v4().to_string();
    id.rsplit('-').next().unwrap_or(&id).to_string()
}

/// Parse duration from string (e.g., "10s", "5m", "1h", "500ms")
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be non-negative: {}", s));
    }

    let secs = match unit {
        "ms" => num / 1000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3600.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    secs_to_duration(secs)
}

fn secs_to_duration(secs: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| format!("Duration out of range: {}s ({})", secs, e))
}

/// Serde helper: a duration given as seconds (`30`, `0.5`) or as a string
/// (`"30s"`, `"2m"`).
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) if secs.is_finite() && secs >= 0.0 => {
            secs_to_duration(secs).map_err(serde::de::Error::custom)
        }
        Raw::Seconds(secs) => Err(serde::de::Error::custom(format!(
            "Duration must be non-negative: {}",
            secs
        ))),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

/// Open `url` in the desktop browser. Failures are logged, never fatal.
pub fn open_browser(url: &str) {
    let mut cmd = if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(url);
        c
    } else if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // The child is not waited on; it is reaped when the uploader exits.
    match cmd.spawn() {
        Ok(_child) => debug!("Opened browser for {}", url),
        Err(e) => warn!("Failed to open browser: {}", e),
    }
}
