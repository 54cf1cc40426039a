//! Settings file management
//!
//! One JSON settings file feeds both binaries. Every field has a default so
//! a partial file, or none at all, still yields a usable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logs::LogLevel;

/// Settings file looked up in the working directory when no explicit
/// `--config=` path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "otawake.json";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Unable to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Tool settings shared by the worker and the console
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// MQTT broker configuration
    #[serde(default)]
    pub mqtt: MqttSettings,

    /// Topic prefix for the wake handshake, e.g. `home/`
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Directory holding the per-device YAML configuration files
    #[serde(default = "default_esphome_dir")]
    pub esphome_dir: PathBuf,

    /// Directory receiving the per-device build/upload log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Domain suffix appended to the device name for upload addressing
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Build/upload tool executable
    #[serde(default = "default_esphome_bin")]
    pub esphome_bin: String,

    /// Worker executable; resolved next to the console's own executable
    /// when unset.
    #[serde(default)]
    pub worker_bin: Option<PathBuf>,
}

fn default_topic_prefix() -> String {
    "home/".to_string()
}

fn default_esphome_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_domain() -> String {
    "local".to_string()
}

fn default_esphome_bin() -> String {
    "esphome".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            mqtt: MqttSettings::default(),
            topic_prefix: default_topic_prefix(),
            esphome_dir: default_esphome_dir(),
            log_dir: default_log_dir(),
            domain: default_domain(),
            esphome_bin: default_esphome_bin(),
            worker_bin: None,
        }
    }
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Broker host
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Optional broker credentials
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Use TLS
    #[serde(default)]
    pub tls: bool,

    /// Optional path to a PEM-encoded CA certificate for broker TLS
    /// verification. When absent, the system certificate store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            tls: false,
            ca_cert_path: None,
        }
    }
}

impl Settings {
    /// Read settings from an explicit file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read settings from `path` when given, otherwise from
    /// [`DEFAULT_SETTINGS_FILE`] if present, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_SETTINGS_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Configuration file name for a device, relative to `esphome_dir`.
    pub fn device_config(&self, device: &str) -> String {
        format!("{}.yaml", device)
    }

    /// Network address the upload tool should target.
    pub fn device_address(&self, device: &str) -> String {
        format!("{}.{}", device, self.domain)
    }

    /// Log file receiving the build/upload tool output for a device.
    pub fn tool_log_file(&self, device: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", device))
    }
}
