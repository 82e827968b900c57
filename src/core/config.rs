use anyhow::{Context, Error, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RESIZE_INTERVAL_MS: u64 = 250;

/// `Configuration` holds the tunables of the tool.
///
/// Values come from `~/.kclone/config.json` (overridable with the
/// `KCLONE_CONFIG` environment variable) and `KCLONE_*` environment
/// variables; every key has a default so no file is required.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Configuration {
    /// Path of the JSON session history file.
    pub history_file: String,
    /// How long to wait for the cloned pod to become ready.
    pub readiness_timeout_secs: u64,
    /// How often the local viewport size is sampled during a session.
    pub resize_interval_ms: u64,
}

impl Configuration {
    pub fn load() -> Result<Self> {
        let config_file = match std::env::var("KCLONE_CONFIG") {
            Ok(value) => value,
            Err(_) => format!("{}/.kclone/config.json", home_dir()?),
        };

        let config = Config::builder()
            .set_default("history_file", default_history_file()?)?
            .set_default("readiness_timeout_secs", DEFAULT_READINESS_TIMEOUT_SECS)?
            .set_default("resize_interval_ms", DEFAULT_RESIZE_INTERVAL_MS)?
            .add_source(File::with_name(&config_file).required(false))
            .add_source(Environment::with_prefix("KCLONE"))
            .build();

        config
            .map_err(Error::msg)
            .and_then(|c| {
                c.try_deserialize::<Configuration>()
                    .context("An error occurred when trying to deserialize the configuration")
            })
            .context("An error occurred when trying to load the configuration")
    }

    pub fn history_path(&self) -> PathBuf {
        PathBuf::from(&self.history_file)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn resize_interval(&self) -> Duration {
        Duration::from_millis(self.resize_interval_ms)
    }
}

fn home_dir() -> Result<String> {
    dirs::home_dir()
        .and_then(|p| p.to_str().map(String::from))
        .ok_or_else(|| Error::msg("Wrong operating system, cannot find home directory"))
}

fn default_history_file() -> Result<String> {
    Ok(format!("{}/.kclone/history.json", home_dir()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunables_convert_to_durations() {
        let configuration = Configuration {
            history_file: "/tmp/history.json".to_string(),
            readiness_timeout_secs: 30,
            resize_interval_ms: 100,
        };

        assert_eq!(configuration.readiness_timeout(), Duration::from_secs(30));
        assert_eq!(configuration.resize_interval(), Duration::from_millis(100));
        assert_eq!(
            configuration.history_path(),
            PathBuf::from("/tmp/history.json")
        );
    }
}
