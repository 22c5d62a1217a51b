//! Simulator configuration.
//!
//! Sources, later ones winning:
//!
//! 1. `NodeConfig::default()`
//! 2. a JSON file named by `GASNODE_CONFIG`
//! 3. individual `GASNODE_*` variables
//!
//! `.env` in the working directory is loaded into the environment first.

use std::path::PathBuf;
use std::str::FromStr;

use gasnode_core::config::ConfigError;
use gasnode_core::storage::BUFFER_FILE;
use gasnode_core::NodeConfig;
use thiserror_no_std::Error;

use crate::platform::{MAX_TIME_SCALE, MIN_TIME_SCALE};

/// Default outbox the simulated relay writes accepted notes to
const OUTBOX_FILE: &str = "relay_outbox.jsonl";

#[derive(Error, Debug)]
pub enum SimConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read {
        path: String,
        reason: std::io::Error,
    },
    #[error("invalid config file {path}: {reason}")]
    Parse {
        path: String,
        reason: serde_json::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error(transparent)]
    Node(#[from] ConfigError),
}

/// How the simulated relay behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Online,
    /// Never answers, so the node boots offline
    Offline,
    /// Answers, but drops a share of transactions
    Flaky,
}

impl FromStr for RelayMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "flaky" => Ok(Self::Flaky),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub node: NodeConfig,
    pub buffer_path: PathBuf,
    pub outbox_path: PathBuf,
    pub relay: RelayMode,
    /// Simulated seconds per real second
    pub time_scale: f64,
    /// Stop after this many cycles; run forever when unset
    pub cycles: Option<u32>,
    pub seed: u64,
    /// Probability that a single ADC read fails
    pub sensor_failure_rate: f64,
    /// Probability that a relay transaction fails in flaky mode
    pub relay_failure_rate: f64,
    /// When off, every suspend fails and the node idles instead
    pub light_sleep: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            buffer_path: PathBuf::from(BUFFER_FILE),
            outbox_path: PathBuf::from(OUTBOX_FILE),
            relay: RelayMode::Online,
            time_scale: 1.0,
            cycles: None,
            seed: 0x6a5_2025,
            sensor_failure_rate: 0.0,
            relay_failure_rate: 0.3,
            light_sleep: true,
        }
    }
}

impl SimConfig {
    /// Load `.env`, then build the config from the process environment.
    pub fn load() -> Result<Self, SimConfigError> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SimConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("GASNODE_CONFIG") {
            config.node = read_node_config(&path)?;
        }

        let node = &mut config.node;
        if let Some(uid) = lookup("GASNODE_PRODUCT_UID") {
            node.relay.product_uid = uid;
        }
        if let Some(file) = lookup("GASNODE_NOTE_FILE") {
            node.relay.note_file = file;
        }
        override_with(&lookup, "GASNODE_READ_INTERVAL_SECS", &mut node.schedule.read_interval_secs)?;
        override_with(&lookup, "GASNODE_WATCHDOG_TIMEOUT_MS", &mut node.schedule.watchdog_timeout_ms)?;
        override_with(&lookup, "GASNODE_SAMPLE_DURATION_SECS", &mut node.sampling.sample_duration_secs)?;
        override_with(&lookup, "GASNODE_SAMPLE_INTERVAL_MS", &mut node.sampling.sample_interval_ms)?;
        override_with(&lookup, "GASNODE_WARMUP_SECS", &mut node.sampling.warmup_secs)?;
        override_with(&lookup, "GASNODE_MAX_RETRIES", &mut node.relay.max_retries)?;
        override_with(&lookup, "GASNODE_MAX_BUFFER_SIZE", &mut node.buffer.max_buffer_size)?;

        if let Some(path) = lookup("GASNODE_BUFFER_PATH") {
            config.buffer_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("GASNODE_OUTBOX_PATH") {
            config.outbox_path = PathBuf::from(path);
        }
        if let Some(mode) = lookup("GASNODE_RELAY") {
            config.relay = mode.parse().map_err(|()| SimConfigError::Invalid {
                key: "GASNODE_RELAY",
                value: mode,
            })?;
        }
        override_with(&lookup, "GASNODE_TIME_SCALE", &mut config.time_scale)?;
        override_with(&lookup, "GASNODE_SEED", &mut config.seed)?;
        override_with(&lookup, "GASNODE_SENSOR_FAILURE_RATE", &mut config.sensor_failure_rate)?;
        override_with(&lookup, "GASNODE_RELAY_FAILURE_RATE", &mut config.relay_failure_rate)?;
        if let Some(raw) = lookup("GASNODE_LIGHT_SLEEP") {
            config.light_sleep = match raw.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                _ => {
                    return Err(SimConfigError::Invalid {
                        key: "GASNODE_LIGHT_SLEEP",
                        value: raw,
                    });
                }
            };
        }
        if let Some(raw) = lookup("GASNODE_CYCLES") {
            config.cycles = Some(parse("GASNODE_CYCLES", raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SimConfigError> {
        self.node.validate()?;

        let checks = [
            (
                "GASNODE_TIME_SCALE",
                self.time_scale,
                (MIN_TIME_SCALE..=MAX_TIME_SCALE).contains(&self.time_scale),
            ),
            (
                "GASNODE_SENSOR_FAILURE_RATE",
                self.sensor_failure_rate,
                (0.0..=1.0).contains(&self.sensor_failure_rate),
            ),
            (
                "GASNODE_RELAY_FAILURE_RATE",
                self.relay_failure_rate,
                (0.0..=1.0).contains(&self.relay_failure_rate),
            ),
        ];
        for (key, value, ok) in checks {
            if !ok {
                return Err(SimConfigError::Invalid {
                    key,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn read_node_config(path: &str) -> Result<NodeConfig, SimConfigError> {
    let text = std::fs::read_to_string(path).map_err(|reason| SimConfigError::Read {
        path: path.to_string(),
        reason,
    })?;
    serde_json::from_str(&text).map_err(|reason| SimConfigError::Parse {
        path: path.to_string(),
        reason,
    })
}

fn parse<T: FromStr>(key: &'static str, raw: String) -> Result<T, SimConfigError> {
    let parsed = raw.trim().parse();
    match parsed {
        Ok(value) => Ok(value),
        Err(_) => Err(SimConfigError::Invalid { key, value: raw }),
    }
}

fn override_with<F, T>(lookup: &F, key: &'static str, target: &mut T) -> Result<(), SimConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = parse(key, raw)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = SimConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.node, NodeConfig::default());
        assert_eq!(config.relay, RelayMode::Online);
        assert_eq!(config.buffer_path, PathBuf::from("sensor_buffer.txt"));
        assert_eq!(config.cycles, None);
    }

    #[test]
    fn test_environment_overrides() {
        let config = SimConfig::from_lookup(lookup(&[
            ("GASNODE_RELAY", "Flaky"),
            ("GASNODE_CYCLES", "12"),
            ("GASNODE_TIME_SCALE", "60"),
            ("GASNODE_READ_INTERVAL_SECS", "60"),
            ("GASNODE_MAX_BUFFER_SIZE", "20"),
            ("GASNODE_PRODUCT_UID", "com.example:test"),
            ("GASNODE_LIGHT_SLEEP", "off"),
        ]))
        .unwrap();

        assert_eq!(config.relay, RelayMode::Flaky);
        assert_eq!(config.cycles, Some(12));
        assert_eq!(config.time_scale, 60.0);
        assert_eq!(config.node.schedule.read_interval_secs, 60);
        assert_eq!(config.node.buffer.max_buffer_size, 20);
        assert_eq!(config.node.relay.product_uid, "com.example:test");
        assert!(!config.light_sleep);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = SimConfig::from_lookup(lookup(&[("GASNODE_RELAY", "sometimes")])).unwrap_err();
        assert!(matches!(err, SimConfigError::Invalid { key: "GASNODE_RELAY", .. }));

        let err = SimConfig::from_lookup(lookup(&[("GASNODE_CYCLES", "-1")])).unwrap_err();
        assert!(matches!(err, SimConfigError::Invalid { key: "GASNODE_CYCLES", .. }));

        let err =
            SimConfig::from_lookup(lookup(&[("GASNODE_SENSOR_FAILURE_RATE", "1.5")])).unwrap_err();
        assert!(matches!(err, SimConfigError::Invalid { .. }));

        for scale in ["0", "1e-300", "NaN", "1e9"] {
            let err = SimConfig::from_lookup(lookup(&[("GASNODE_TIME_SCALE", scale)])).unwrap_err();
            assert!(matches!(err, SimConfigError::Invalid { key: "GASNODE_TIME_SCALE", .. }));
        }
    }

    #[test]
    fn test_node_validation_applies() {
        let err = SimConfig::from_lookup(lookup(&[("GASNODE_SAMPLE_INTERVAL_MS", "9000")]))
            .unwrap_err();
        assert!(matches!(
            err,
            SimConfigError::Node(ConfigError::StarvesWatchdog { .. })
        ));
    }

    #[test]
    fn test_json_config_file() {
        let path = std::env::temp_dir().join(format!("gasnode-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"schedule": {"read_interval_secs": 120}}"#).unwrap();

        let config = SimConfig::from_lookup(lookup(&[(
            "GASNODE_CONFIG",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.node.schedule.read_interval_secs, 120);
        assert_eq!(config.node.relay.max_retries, 3);
    }
}
