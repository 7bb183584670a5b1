//! Layered runtime configuration.
//!
//! Defaults < TOML file < `ADEX_`-prefixed environment variables, merged with
//! figment. Nested keys use `__` in the environment, e.g.
//! `ADEX_SERVER__BIND_ADDR=0.0.0.0:5555`.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

pub const DEFAULT_CONFIG_FILE: &str = "adex.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub experiment: ExperimentSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Control channel bind address.
    pub bind_addr: String,
    /// How long one control-loop tick waits on the socket.
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSettings {
    /// Targets requested from the adaptive engine per iteration.
    pub batch_size: usize,
    /// Observations between engine training passes.
    pub training_interval: usize,
    /// Worker sleep while the run is paused or settling.
    #[serde(with = "humantime_serde")]
    pub worker_idle: Duration,
    /// Worker sleep between measurement drains within one iteration.
    #[serde(with = "humantime_serde")]
    pub measure_poll: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5555".into(),
            poll_timeout: Duration::from_millis(50),
        }
    }
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            batch_size: 1,
            training_interval: 2000,
            worker_idle: Duration::from_millis(10),
            measure_poll: Duration::from_millis(1),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            experiment: ExperimentSettings::default(),
        }
    }
}

impl Settings {
    /// Loads from the default file location (if present) and environment.
    pub fn load() -> CoreResult<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> CoreResult<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ADEX_").split("__"))
            .extract()?;
        Ok(settings)
    }
}
