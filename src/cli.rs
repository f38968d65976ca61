use crate::config::{BrowserOpen, UploaderSettings};
use crate::error::Result;
use crate::utils::parse_duration;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// InfluxDB Uploader - replay aggregated test metrics into InfluxDB
#[derive(Parser, Debug, Clone, Default)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// JSON settings file (kebab-case keys, e.g. "send-interval")
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Snapshots as JSON lines; "-" reads standard input
    #[clap(short = 'i', long, default_value = "-")]
    pub input: String,

    /// Interval between uploads
    #[clap(long, value_parser = parse_duration, help_heading = "Overrides")]
    pub send_interval: Option<Duration>,

    /// When to open the dashboard link: start, end, both or none
    #[clap(long, help_heading = "Overrides")]
    pub browser_open: Option<BrowserOpen>,

    /// Project tag attached to every point
    #[clap(long, help_heading = "Overrides")]
    pub project: Option<String>,

    /// Extra tags as key=value, repeatable
    #[clap(long = "tag", value_parser = parse_tag, help_heading = "Overrides")]
    pub tags: Vec<(String, String)>,

    /// Factor converting response times (seconds) into reported units
    #[clap(long, help_heading = "Overrides")]
    pub report_times_multiplier: Option<u64>,

    #[clap(long, help_heading = "Overrides")]
    pub influxdb_address: Option<String>,

    #[clap(long, help_heading = "Overrides")]
    pub influxdb_port: Option<u16>,

    #[clap(long, help_heading = "Overrides")]
    pub influxdb_database: Option<String>,

    /// Transport timeout, also the delay before the single retry
    #[clap(long, value_parser = parse_duration, help_heading = "Overrides")]
    pub timeout: Option<Duration>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Load the settings file (or defaults) and apply command-line overrides.
    pub fn settings(&self) -> Result<UploaderSettings> {
        let mut settings = match &self.config {
            Some(path) => UploaderSettings::from_file(path)?,
            None => UploaderSettings::default(),
        };
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut UploaderSettings) {
        if let Some(interval) = self.send_interval {
            settings.send_interval = interval;
        }
        if let Some(browser_open) = self.browser_open {
            settings.browser_open = browser_open;
        }
        if let Some(ref project) = self.project {
            settings.project = project.clone();
        }
        settings.custom_tags.extend(self.tags.iter().cloned());
        if let Some(multiplier) = self.report_times_multiplier {
            settings.report_times_multiplier = multiplier;
        }
        if let Some(ref address) = self.influxdb_address {
            settings.influxdb_address = address.clone();
        }
        if let Some(port) = self.influxdb_port {
            settings.influxdb_port = port;
        }
        if let Some(ref database) = self.influxdb_database {
            settings.influxdb_database = Some(database.clone());
        }
        if let Some(timeout) = self.timeout {
            settings.timeout = timeout;
        }
    }
}

fn parse_tag(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("Invalid tag '{}', expected key=value", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_tag() {
        assert_eq!(
            parse_tag("env=staging").unwrap(),
            ("env".to_string(), "staging".to_string())
        );
        assert_eq!(
            parse_tag("url=a=b").unwrap(),
            ("url".to_string(), "a=b".to_string())
        );
        assert!(parse_tag("novalue").is_err());
        assert!(parse_tag("=x").is_err());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"project": "from-file", "influxdb-database": "filedb", "send-interval": 60}}"#
        )
        .unwrap();

        let args = Args::try_parse_from([
            "influxdb-uploader",
            "--config",
            file.path().to_str().unwrap(),
            "--project",
            "from-cli",
            "--send-interval",
            "5s",
            "--tag",
            "env=ci",
            "--browser-open",
            "none",
        ])
        .unwrap();

        let settings = args.settings().unwrap();
        assert_eq!(settings.project, "from-cli");
        assert_eq!(settings.send_interval, Duration::from_secs(5));
        assert_eq!(settings.database(), Some("filedb"));
        assert_eq!(settings.custom_tags["env"], "ci");
        assert_eq!(settings.browser_open, BrowserOpen::None);
    }

    #[test]
    fn test_defaults_without_config() {
        let args = Args::try_parse_from(["influxdb-uploader"]).unwrap();
        assert_eq!(args.input, "-");
        let settings = args.settings().unwrap();
        assert_eq!(settings.send_interval, crate::defaults::SEND_INTERVAL);
        assert!(settings.database().is_none());
    }

    #[test]
    fn test_oversized_interval_is_rejected() {
        let result = Args::try_parse_from(["influxdb-uploader", "--send-interval", "1e30s"]);
        assert!(result.is_err());
    }
}
