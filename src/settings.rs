use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Engine configuration. Every field has a default, so a TOML file only
/// needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ping_endpoint: String,
    pub ping_probe_count: usize,
    pub ping_interval_ms: u64,
    /// Round trips at or above this are discarded.
    pub ping_ceiling_ms: f64,
    pub probe_timeout_ms: u64,

    pub download_endpoints: Vec<String>,

    pub upload_endpoints: Vec<String>,
    pub upload_payload_bytes: usize,
    pub upload_streams: usize,

    pub sample_buffer_capacity: usize,
    pub sample_interval_ms: u64,
    pub min_sample_elapsed_ms: u64,
    pub transfer_timeout_ms: u64,

    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ping_endpoint: "https://speed.cloudflare.com/__down?bytes=0".into(),
            ping_probe_count: 5,
            ping_interval_ms: 100,
            ping_ceiling_ms: 500.0,
            probe_timeout_ms: 5_000,
            download_endpoints: vec![
                "https://speed.cloudflare.com/__down?bytes=25000000".into(),
                "https://speed.cloudflare.com/__down?bytes=10000000".into(),
                "https://proof.ovh.net/files/10Mb.dat".into(),
                "https://speed.hetzner.de/10MB.bin".into(),
            ],
            upload_endpoints: vec!["https://speed.cloudflare.com/__up".into()],
            upload_payload_bytes: 4 * 1024 * 1024,
            upload_streams: 2,
            sample_buffer_capacity: 60,
            sample_interval_ms: 100,
            min_sample_elapsed_ms: 100,
            transfer_timeout_ms: 30_000,
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file and validate them.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let settings: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ping_probe_count == 0 {
            return Err(Error::InvalidConfig("ping_probe_count must be at least 1".into()));
        }
        if self.ping_endpoint.is_empty() {
            return Err(Error::InvalidConfig("ping_endpoint is empty".into()));
        }
        if self.download_endpoints.is_empty() {
            return Err(Error::InvalidConfig("no download endpoints configured".into()));
        }
        if self.upload_endpoints.is_empty() {
            return Err(Error::InvalidConfig("no upload endpoints configured".into()));
        }
        if self.upload_payload_bytes == 0 {
            return Err(Error::InvalidConfig("upload_payload_bytes must be non-zero".into()));
        }
        if self.upload_streams == 0 {
            return Err(Error::InvalidConfig("upload_streams must be at least 1".into()));
        }
        if self.sample_buffer_capacity == 0 {
            return Err(Error::InvalidConfig("sample_buffer_capacity must be non-zero".into()));
        }
        if self.sample_interval_ms == 0 || self.transfer_timeout_ms == 0 || self.probe_timeout_ms == 0 {
            return Err(Error::InvalidConfig("intervals and timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn min_sample_elapsed(&self) -> Duration {
        Duration::from_millis(self.min_sample_elapsed_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`.
    pub level: String,

    /// `text` or `json`.
    pub format: String,

    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
            file: None,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Output goes to `config.file` when set, otherwise to stderr.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let writer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            fmt::writer::BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => fmt::writer::BoxMakeWriter::new(std::io::stderr),
    };
    let ansi = config.file.is_none();

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json().with_writer(writer))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(ansi).with_writer(writer))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.ping_probe_count, 5);
        assert_eq!(settings.upload_payload_bytes, 4_194_304);
        assert_eq!(settings.download_endpoints.len(), 4);
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
ping_probe_count = 6
ping_interval_ms = 150
download_endpoints = ["http://localhost:9000/blob"]

[logging]
level = "debug"
"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.ping_probe_count, 6);
        assert_eq!(settings.ping_interval(), Duration::from_millis(150));
        assert_eq!(settings.download_endpoints, vec!["http://localhost:9000/blob"]);
        assert_eq!(settings.sample_buffer_capacity, 60);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, "text");
    }

    #[test]
    fn rejects_empty_endpoint_lists() {
        let settings = Settings {
            download_endpoints: Vec::new(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));

        let settings = Settings {
            upload_streams: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unparsable_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ping_probe_count = \"many\"").unwrap();
        assert!(matches!(Settings::load(file.path()), Err(Error::Config(_))));
    }
}
