//! Configuration (M, §6, §10). Layered defaults → `VesselCore.toml` →
//! `VESSELCORE_`-prefixed environment variables, exactly as
//! `mmoldb-ingest::config::IngestConfig` layers its own figment.

use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::FeedId;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WatchedFeedPaths {
    pub arrived: PathBuf,
    pub departed: PathBuf,
    pub expected_arrivals: PathBuf,
    pub expected_departures: PathBuf,
}

impl WatchedFeedPaths {
    pub fn as_map(&self) -> hashbrown::HashMap<FeedId, PathBuf> {
        hashbrown::HashMap::from([
            (FeedId::Arrived, self.arrived.clone()),
            (FeedId::Departed, self.departed.clone()),
            (FeedId::ExpectedArrivals, self.expected_arrivals.clone()),
            (FeedId::ExpectedDepartures, self.expected_departures.clone()),
        ])
    }
}

impl Default for WatchedFeedPaths {
    fn default() -> Self {
        Self {
            arrived: PathBuf::from("data/arrived.xml"),
            departed: PathBuf::from("data/departed.xml"),
            expected_arrivals: PathBuf::from("data/expected_arrivals.xml"),
            expected_departures: PathBuf::from("data/expected_departures.xml"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VesselCoreConfig {
    pub vessel_update_interval_s: u64,
    pub file_poll_interval_s: u64,
    pub cache_default_ttl_s: u64,
    pub breaker_threshold: u32,
    pub breaker_reset_interval_s: u64,
    pub enable_file_monitoring: bool,
    pub auto_reload_on_file_change: bool,
    pub watched_feeds: WatchedFeedPaths,
    pub historical_throughput_path: Option<PathBuf>,
    pub avg_teu_per_ship: f64,
    pub cross_ref_deviation_threshold_pct: f64,
    pub file_read_timeout_s: u64,
    pub log_filter: String,
    /// §4.12 freshness thresholds, in days/hours so they round-trip cleanly
    /// through TOML/env without a `chrono::Duration` serde shim.
    pub container_freshness_fresh_days: i64,
    pub container_freshness_stale_days: i64,
    pub vessel_freshness_real_time_hours: i64,
    pub vessel_freshness_recent_hours: i64,
}

impl Default for VesselCoreConfig {
    fn default() -> Self {
        Self {
            vessel_update_interval_s: 300,
            file_poll_interval_s: 5,
            cache_default_ttl_s: 3600,
            breaker_threshold: 5,
            breaker_reset_interval_s: 300,
            enable_file_monitoring: true,
            auto_reload_on_file_change: true,
            watched_feeds: WatchedFeedPaths::default(),
            historical_throughput_path: None,
            avg_teu_per_ship: 2000.0,
            cross_ref_deviation_threshold_pct: 20.0,
            file_read_timeout_s: 10,
            log_filter: "info".to_string(),
            container_freshness_fresh_days: 60,
            container_freshness_stale_days: 180,
            vessel_freshness_real_time_hours: 1,
            vessel_freshness_recent_hours: 24,
        }
    }
}

impl VesselCoreConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("VesselCore.toml"))
            .merge(Env::prefixed("VESSELCORE_"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = VesselCoreConfig::default();
        assert_eq!(config.vessel_update_interval_s, 300);
        assert_eq!(config.breaker_threshold, 5);
        assert_eq!(config.avg_teu_per_ship, 2000.0);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn env_override_wins_over_default() {
        // SAFETY: test is single-threaded within this process's test harness
        // for this variable; figment reads the environment at extract time.
        unsafe {
            std::env::set_var("VESSELCORE_BREAKER_THRESHOLD", "9");
        }
        let config = VesselCoreConfig::figment().extract::<VesselCoreConfig>().unwrap();
        assert_eq!(config.breaker_threshold, 9);
        unsafe {
            std::env::remove_var("VESSELCORE_BREAKER_THRESHOLD");
        }
    }
}
