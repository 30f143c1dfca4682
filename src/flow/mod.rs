//! Flow tracking
//!
//! Aggregates packets into flows keyed by the exact 5-tuple and derives
//! the statistical feature vectors consumed by the classifiers.
//!
//! # Example
//!
//! ```ignore
//! use anomflow::flow::{FlowConfig, FlowTracker};
//!
//! let mut tracker = FlowTracker::new(FlowConfig::default());
//! let key = tracker.observe(&meta, ts);
//! let features = tracker.features(&key);
//! ```

pub mod tracker;

pub use tracker::{FeatureVector, FlowKey, FlowRecord, FlowTracker, FEATURE_NAMES, NUM_FEATURES};

use serde::{Deserialize, Serialize};

fn default_flow_timeout() -> f64 {
    60.0
}

fn default_cleanup_interval() -> u64 {
    100
}

fn default_feature_defaults() -> bool {
    true
}

/// Configuration for flow tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Seconds of inactivity before a flow is evicted
    #[serde(default = "default_flow_timeout")]
    pub flow_timeout_secs: f64,

    /// Run an eviction sweep every N processed packets
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,

    /// Substitute neutral defaults when a flow is too young to have
    /// meaningful statistics (fewer than 2 packets)
    #[serde(default = "default_feature_defaults")]
    pub feature_defaults: bool,

    /// Bound per-flow packet history; unbounded when unset
    #[serde(default)]
    pub max_history: Option<usize>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            flow_timeout_secs: default_flow_timeout(),
            cleanup_interval: default_cleanup_interval(),
            feature_defaults: default_feature_defaults(),
            max_history: None,
        }
    }
}

/// Flow tracking statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Total flows created
    pub flows_created: u64,
    /// Total flows evicted by timeout
    pub flows_evicted: u64,
    /// Current active flows
    pub active_flows: usize,
    /// Packets observed
    pub packets_observed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FlowConfig::default();
        assert_eq!(config.flow_timeout_secs, 60.0);
        assert_eq!(config.cleanup_interval, 100);
        assert!(config.feature_defaults);
        assert!(config.max_history.is_none());
    }

    #[test]
    fn test_config_toml_defaults() {
        let config: FlowConfig = toml::from_str("").unwrap();
        assert_eq!(config.flow_timeout_secs, 60.0);
        assert_eq!(config.cleanup_interval, 100);
    }
}
