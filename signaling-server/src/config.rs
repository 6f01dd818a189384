use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::anyhow;
use log::LevelFilter;
use serde::Deserialize;

use crate::relay::RelaySettings;

/// Prefix shared by every environment variable the relay reads.
pub const ENV_PREFIX: &str = "GANT_MEET_";

/// Relay settings read from `GANT_MEET_*` environment variables.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub access_secret: Option<String>,
    #[serde(default)]
    pub room_capacity: Option<usize>,
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9001))
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Config {
    /// # Errors
    /// Fails if a variable is present but cannot be parsed.
    pub fn from_env() -> crate::Result<Self> {
        Ok(envy::prefixed(ENV_PREFIX).from_env::<Self>()?)
    }

    /// # Errors
    /// Fails if `log_level` is not one of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub fn level_filter(&self) -> crate::Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|err| anyhow!("invalid log level {:?}: {err}", self.log_level))
    }

    #[must_use]
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            access_secret: self.access_secret.clone(),
            room_capacity: self.room_capacity,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        envy::prefixed(ENV_PREFIX)
            .from_iter(
                pairs
                    .iter()
                    .map(|(key, value)| ((*key).to_owned(), (*value).to_owned())),
            )
            .unwrap()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = from_pairs(&[]);
        assert_eq!(config.address, default_address());
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Info);
        assert!(config.relay_settings().access_secret.is_none());
        assert!(config.relay_settings().room_capacity.is_none());
    }

    #[test]
    fn prefixed_variables_are_read() {
        let config = from_pairs(&[
            ("GANT_MEET_ADDRESS", "0.0.0.0:8080"),
            ("GANT_MEET_LOG_LEVEL", "debug"),
            ("GANT_MEET_ACCESS_SECRET", "aula"),
            ("GANT_MEET_ROOM_CAPACITY", "2"),
            ("ADDRESS", "10.0.0.1:1"),
        ]);
        assert_eq!(config.address, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Debug);
        assert_eq!(config.access_secret.as_deref(), Some("aula"));
        assert_eq!(config.room_capacity, Some(2));
    }

    #[test]
    fn bad_log_level_is_reported() {
        let config = from_pairs(&[("GANT_MEET_LOG_LEVEL", "loud")]);
        assert!(config.level_filter().is_err());
    }
}
