use crate::prelude::*;
use crate::simpleip::{ClientSettings, DEFAULT_PORT};

use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub tv: Tv,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

// Tv {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Tv {
    pub host: String,
    #[serde(default = "Config::default_port")]
    pub port: u16,

    pub connect_timeout_ms: Option<u64>,
    pub keepalive_initial_delay_ms: Option<u64>,
    pub supervision_interval_ms: Option<u64>,
    pub read_timeout_slack_ms: Option<u64>,
    pub fast_retry_count: Option<u32>,
    pub fast_retry_delay_ms: Option<u64>,
    pub slow_retry_delay_ms: Option<u64>,

    /// Historic behavior reconnects the whole link when a frame cannot be
    /// interpreted; set false to just drop the frame instead.
    pub reconnect_on_decode_error: Option<bool>,
}

impl Tv {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Merge the configured overrides onto the protocol defaults.
    pub fn client_settings(&self) -> ClientSettings {
        let defaults = ClientSettings::default();
        let ms = Duration::from_millis;
        ClientSettings {
            connect_timeout: self.connect_timeout_ms.map_or(defaults.connect_timeout, ms),
            keepalive_initial_delay: self
                .keepalive_initial_delay_ms
                .map_or(defaults.keepalive_initial_delay, ms),
            supervision_interval: self
                .supervision_interval_ms
                .map_or(defaults.supervision_interval, ms),
            read_timeout_slack: self
                .read_timeout_slack_ms
                .map_or(defaults.read_timeout_slack, ms),
            fast_retry_count: self.fast_retry_count.unwrap_or(defaults.fast_retry_count),
            fast_retry_delay: self
                .fast_retry_delay_ms
                .map_or(defaults.fast_retry_delay, ms),
            slow_retry_delay: self
                .slow_retry_delay_ms
                .map_or(defaults.slow_retry_delay, ms),
            reconnect_on_decode_error: self
                .reconnect_on_decode_error
                .unwrap_or(defaults.reconnect_on_decode_error),
        }
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn tv(&self) -> &Tv {
        &self.tv
    }

    pub fn loglevel(&self) -> String {
        self.loglevel.clone()
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_PORT
    }
}
