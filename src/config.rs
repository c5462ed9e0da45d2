//! Daemon configuration.
//!
//! Options are layered: built-in defaults, then the JSON config file, then
//! `XHOUNDPI_` environment variables, then the command line.
use std::path::{Path, PathBuf};

use argh::FromArgs;
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{geo::GeoCoordinates, policy::DEFAULT_EXCLUDED_SENTENCES, queue::DEFAULT_CAPACITY};

/// Prefix of the environment variables overriding file options
pub const ENV_PREFIX: &str = "XHOUNDPI_";

const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
/// Failures while loading or storing the configuration
pub enum ConfigError {
    /// The config file could not be read
    #[error("Cannot read config file {path:?}: {source}")]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`Config`]
    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        /// File that was parsed
        path: PathBuf,
        /// Underlying failure
        source: serde_json::Error,
    },
    /// An environment override could not be parsed
    #[error("Invalid value '{value}' for {name}")]
    Env {
        /// Variable name
        name: String,
        /// Rejected value
        value: String,
    },
    /// A setting is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    /// The configuration could not be written
    #[error("Cannot store configuration: {0}")]
    Store(#[from] std::io::Error),
}

#[derive(FromArgs, Debug, Default)]
/// xHoundPi GNSS message processing daemon
pub struct CliArgs {
    /// JSON configuration file
    #[argh(option)]
    pub config: Option<PathBuf>,
    /// capacity of the message queues
    #[argh(option)]
    pub buffer_capacity: Option<usize>,
    /// use files instead of the serial port
    #[argh(switch)]
    pub mock_gnss: bool,
    /// file the mock receiver reads from
    #[argh(option)]
    pub gnss_mock_input: Option<PathBuf>,
    /// file the mock receiver writes to
    #[argh(option)]
    pub gnss_mock_output: Option<PathBuf>,
    /// serial device
    #[argh(option)]
    pub serial_port: Option<String>,
    /// baud rate
    #[argh(option)]
    pub baud_rate: Option<u32>,
    /// serial timeout in milliseconds
    #[argh(option)]
    pub serial_timeout_ms: Option<u64>,
    /// seconds between metrics reports, 0 disables them
    #[argh(option)]
    pub metrics_logger_freq: Option<u64>,
    /// log level
    #[argh(option)]
    pub log_level: Option<String>,
    /// significant digits of decimal arithmetic
    #[argh(option)]
    pub decimal_precision: Option<u32>,
    /// store the effective configuration in the default location
    #[argh(switch)]
    pub save_config: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// Antenna mount: orientation in radians and the distance to the antenna
pub struct OrientationConfig {
    /// Rotation about the vertical axis
    pub yaw: Decimal,
    /// Rotation about the lateral axis
    pub pitch: Decimal,
    /// Rotation about the longitudinal axis
    pub roll: Decimal,
    /// Distance from the device to the antenna in meters
    pub radius: Decimal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
/// Effective configuration of the daemon
pub struct Config {
    /// Capacity of each message queue
    pub buffer_capacity: usize,
    /// Replay files instead of opening the serial port
    pub mock_gnss: bool,
    /// Recording replayed by the mock receiver
    pub gnss_mock_input: PathBuf,
    /// File the mock receiver writes to
    pub gnss_mock_output: PathBuf,
    /// Serial device
    pub serial_port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub serial_timeout_ms: u64,
    /// Seconds between metrics reports, 0 disables them
    pub metrics_logger_freq: u64,
    /// Default `env_logger` filter
    pub log_level: String,
    /// Significant digits of decimal arithmetic
    pub decimal_precision: u32,
    /// Static offset in degrees and meters
    pub offset: GeoCoordinates,
    /// Replaces the static offset when present
    pub orientation: Option<OrientationConfig>,
    /// Where meters are converted to degrees for the orientation offset
    pub reference: GeoCoordinates,
    /// NMEA sentence types never offset
    pub excluded_sentences: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_CAPACITY,
            mock_gnss: false,
            gnss_mock_input: PathBuf::from("gnss_mock_input.bin"),
            gnss_mock_output: PathBuf::from("gnss_mock_output.bin"),
            serial_port: "/dev/serial0".to_string(),
            baud_rate: 38400,
            serial_timeout_ms: 100,
            metrics_logger_freq: 0,
            log_level: "info".to_string(),
            decimal_precision: 24,
            offset: GeoCoordinates::default(),
            orientation: None,
            reference: GeoCoordinates::default(),
            excluded_sentences: DEFAULT_EXCLUDED_SENTENCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

fn env_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn env_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

impl Config {
    /// Resolve the configuration for `cli` from every layer
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_path().join(CONFIG_FILE);
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(std::env::vars())?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file; missing options keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override scalar options from `XHOUNDPI_*` variables
    pub fn apply_env(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (name, value) in vars {
            let Some(option) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match option.to_ascii_lowercase().as_str() {
                "buffer_capacity" => self.buffer_capacity = env_value(&name, &value)?,
                "mock_gnss" => self.mock_gnss = env_bool(&name, &value)?,
                "gnss_mock_input" => self.gnss_mock_input = PathBuf::from(value),
                "gnss_mock_output" => self.gnss_mock_output = PathBuf::from(value),
                "serial_port" => self.serial_port = value,
                "baud_rate" => self.baud_rate = env_value(&name, &value)?,
                "serial_timeout_ms" => self.serial_timeout_ms = env_value(&name, &value)?,
                "metrics_logger_freq" => self.metrics_logger_freq = env_value(&name, &value)?,
                "log_level" => self.log_level = value,
                "decimal_precision" => self.decimal_precision = env_value(&name, &value)?,
                _ => log::debug!("Ignoring unknown variable {name}"),
            }
        }
        Ok(())
    }

    /// Override options given on the command line
    pub fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(capacity) = cli.buffer_capacity {
            self.buffer_capacity = capacity;
        }
        if cli.mock_gnss {
            self.mock_gnss = true;
        }
        if let Some(path) = &cli.gnss_mock_input {
            self.gnss_mock_input = path.clone();
        }
        if let Some(path) = &cli.gnss_mock_output {
            self.gnss_mock_output = path.clone();
        }
        if let Some(port) = &cli.serial_port {
            self.serial_port = port.clone();
        }
        if let Some(baud_rate) = cli.baud_rate {
            self.baud_rate = baud_rate;
        }
        if let Some(timeout) = cli.serial_timeout_ms {
            self.serial_timeout_ms = timeout;
        }
        if let Some(freq) = cli.metrics_logger_freq {
            self.metrics_logger_freq = freq;
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        if let Some(precision) = cli.decimal_precision {
            self.decimal_precision = precision;
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be at least 1".into(),
            ));
        }
        if !(1..=28).contains(&self.decimal_precision) {
            return Err(ConfigError::Invalid(format!(
                "decimal_precision {} is outside 1..=28",
                self.decimal_precision
            )));
        }
        if let Some(orientation) = &self.orientation {
            if orientation.radius.is_sign_negative() {
                return Err(ConfigError::Invalid("orientation radius is negative".into()));
            }
        }
        Ok(())
    }

    /// Store the configuration in the default location
    pub fn store_default(&self) -> Result<PathBuf, ConfigError> {
        let dir = default_path();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

fn default_path() -> PathBuf {
    if let Some(path) = ProjectDirs::from("", "", "xhoundpi") {
        path.config_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}
