//! Simulation configuration record (§6) and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A closed range `[lo, hi]` used for every "(lo, hi)" config field in §6
/// (speeds, pause durations, jitter).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub lo: f64,
    pub hi: f64,
}

impl Range {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("num_nodes must be at least 1")]
    NoNodes,
    #[error("world_size dimensions must be positive")]
    BadWorldSize,
    #[error("comm_range must be positive")]
    BadCommRange,
    #[error("{field} must have lo <= hi and lo >= 0")]
    BadRange { field: &'static str },
    #[error("{field} must be positive")]
    BadPeriod { field: &'static str },
    #[error("malformed config json: {0}")]
    Serialization(String),
}

impl PartialEq for ConfigError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

/// The single configuration record for a run (§6's table, one field per
/// row). `serde`-derived so it can be round-tripped like any fledger node
/// config, and constructible piece by piece from CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub num_nodes: u32,
    pub world_size: (f64, f64),
    pub comm_range: f64,

    pub hello_period_s: f64,
    pub dv_period_s: f64,
    pub mobility_step_s: f64,

    pub app_send_period_s: f64,
    pub app_pairs_per_period: u32,

    pub sim_time_s: f64,

    pub speed_mps: Range,
    pub waypoint_pause_s: Range,

    pub channel_jitter_s: Range,
    pub channel_base_delay_s: f64,
    pub prop_speed_mps: f64,
    pub max_per_hop_delay_s: f64,

    pub mac_min_backoff_s: f64,
    pub mac_max_backoff_s: f64,
    pub mac_slot_s: f64,
    pub mac_tx_duration_s: f64,

    pub neighbor_timeout_s: f64,

    pub data_payload_bytes: usize,

    pub seed: u64,
}

impl Default for SimConfig {
    /// Mirrors the original implementation's `SIM_CONFIG` defaults
    /// (`original_source/config.py`), minus the visualizer-only keys
    /// (`node_size`, `fps`, `trace_ttl_s`, ... — out of scope per §1).
    fn default() -> Self {
        Self {
            num_nodes: 4,
            world_size: (1000.0, 700.0),
            comm_range: 260.0,
            hello_period_s: 0.6,
            dv_period_s: 1.2,
            mobility_step_s: 0.20,
            app_send_period_s: 1.6,
            app_pairs_per_period: 2,
            sim_time_s: 120.0,
            speed_mps: Range::new(10.0, 22.0),
            waypoint_pause_s: Range::new(0.0, 0.4),
            channel_jitter_s: Range::new(0.002, 0.020),
            channel_base_delay_s: 0.001,
            prop_speed_mps: 3e8,
            max_per_hop_delay_s: 0.015,
            mac_min_backoff_s: 0.001,
            mac_max_backoff_s: 0.006,
            mac_slot_s: 0.001,
            mac_tx_duration_s: 0.003,
            neighbor_timeout_s: 2.0,
            data_payload_bytes: 32,
            seed: 42,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_nodes < 1 {
            return Err(ConfigError::NoNodes);
        }
        if self.world_size.0 <= 0.0 || self.world_size.1 <= 0.0 {
            return Err(ConfigError::BadWorldSize);
        }
        if self.comm_range <= 0.0 {
            return Err(ConfigError::BadCommRange);
        }
        check_range(self.speed_mps, "speed_mps")?;
        check_range(self.waypoint_pause_s, "waypoint_pause_s")?;
        check_range(self.channel_jitter_s, "channel_jitter_s")?;
        check_positive(self.hello_period_s, "hello_period_s")?;
        check_positive(self.dv_period_s, "dv_period_s")?;
        check_positive(self.mobility_step_s, "mobility_step_s")?;
        check_positive(self.app_send_period_s, "app_send_period_s")?;
        check_positive(self.neighbor_timeout_s, "neighbor_timeout_s")?;
        check_positive(self.mac_slot_s, "mac_slot_s")?;
        check_positive(self.mac_tx_duration_s, "mac_tx_duration_s")?;
        if self.mac_min_backoff_s < 0.0 || self.mac_max_backoff_s < self.mac_min_backoff_s {
            return Err(ConfigError::BadRange { field: "mac_backoff_s" });
        }
        Ok(())
    }

    /// Serializes to a JSON string, the way the teacher's `flo` records
    /// round-trip their config payloads through `serde_json`.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialization(e.to_string()))
    }

    /// Parses a config from JSON, then validates it.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| ConfigError::Serialization(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn check_range(r: Range, field: &'static str) -> Result<(), ConfigError> {
    if r.lo < 0.0 || r.hi < r.lo {
        return Err(ConfigError::BadRange { field });
    }
    Ok(())
}

fn check_positive(v: f64, field: &'static str) -> Result<(), ConfigError> {
    if v <= 0.0 {
        return Err(ConfigError::BadPeriod { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_nodes() {
        let mut cfg = SimConfig::default();
        cfg.num_nodes = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::NoNodes));
    }

    #[test]
    fn rejects_inverted_range() {
        let mut cfg = SimConfig::default();
        cfg.speed_mps = Range::new(10.0, 5.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_round_trip_preserves_config() {
        let cfg = SimConfig::default();
        let json = cfg.to_json().expect("serializes");
        let back = SimConfig::from_json(&json).expect("parses and validates");
        assert_eq!(cfg, back);
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        assert!(SimConfig::from_json("not json").is_err());
    }
}
