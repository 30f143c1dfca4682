//! Flow tracker
//!
//! Maintains the live flow table keyed by the exact 5-tuple as seen on
//! the wire (no direction canonicalization, so each direction of a
//! conversation is its own flow) and computes per-flow feature vectors.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::packet::{IpProtocol, PacketMeta};
use super::{FlowConfig, TrackerStats};

/// Number of features in a flow feature vector
pub const NUM_FEATURES: usize = 8;

/// Feature names, in vector order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "flow_duration",
    "fwd_packets",
    "bwd_packets",
    "iat_mean",
    "iat_std",
    "pkt_len_mean",
    "pkt_len_std",
    "packets_per_second",
];

/// Duration floor applied to flows too young to span any time
const DURATION_EPSILON: f64 = 0.001;

/// Exact 5-tuple flow identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub protocol: IpProtocol,
}

impl FlowKey {
    pub fn from_meta(meta: &PacketMeta) -> Self {
        Self {
            src_ip: meta.src_ip,
            src_port: meta.src_port,
            dst_ip: meta.dst_ip,
            dst_port: meta.dst_port,
            protocol: meta.protocol,
        }
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}-{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )
    }
}

/// Accumulated state of a single flow
#[derive(Debug, Clone)]
pub struct FlowRecord {
    /// Timestamp of the first packet (seconds since capture start)
    pub start_time: f64,
    /// Timestamp of the most recent packet
    pub last_seen: f64,
    /// Total packets observed
    pub total_packets: u64,
    /// Packets observed in the key's direction
    pub fwd_packets: u64,
    /// Captured sizes of observed packets
    pub packet_sizes: VecDeque<u32>,
    /// Gaps between consecutive packets (seconds)
    pub inter_arrival_times: VecDeque<f64>,
}

impl FlowRecord {
    fn new(ts: f64) -> Self {
        Self {
            start_time: ts,
            last_seen: ts,
            total_packets: 0,
            fwd_packets: 1,
            packet_sizes: VecDeque::new(),
            inter_arrival_times: VecDeque::new(),
        }
    }
}

/// Fixed-size feature vector for one flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; NUM_FEATURES],
}

impl FeatureVector {
    pub fn new(values: [f64; NUM_FEATURES]) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        self.values.get(idx).copied()
    }
}

/// Live flow table plus feature derivation
pub struct FlowTracker {
    config: FlowConfig,
    flows: HashMap<FlowKey, FlowRecord>,
    stats: TrackerStats,
}

impl FlowTracker {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            flows: HashMap::new(),
            stats: TrackerStats::default(),
        }
    }

    /// Fold one packet into its flow, creating the flow if needed
    ///
    /// `ts` is seconds since capture start. Returns the key of the flow
    /// the packet belongs to.
    pub fn observe(&mut self, meta: &PacketMeta, ts: f64) -> FlowKey {
        let key = FlowKey::from_meta(meta);
        self.stats.packets_observed += 1;

        let record = match self.flows.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                // Inter-arrival gap is measured against the previous packet,
                // so it is recorded before last_seen moves forward.
                record.inter_arrival_times.push_back(ts - record.last_seen);
                record.fwd_packets += 1;
                record
            }
            Entry::Vacant(entry) => {
                self.stats.flows_created += 1;
                entry.insert(FlowRecord::new(ts))
            }
        };

        record.last_seen = ts;
        record.total_packets += 1;
        record.packet_sizes.push_back(meta.length);

        if let Some(bound) = self.config.max_history {
            while record.packet_sizes.len() > bound {
                record.packet_sizes.pop_front();
            }
            while record.inter_arrival_times.len() > bound {
                record.inter_arrival_times.pop_front();
            }
        }

        self.stats.active_flows = self.flows.len();
        key
    }

    /// Feature vector for a flow, honoring the configured default policy
    pub fn features(&self, key: &FlowKey) -> Option<FeatureVector> {
        self.features_with(key, self.config.feature_defaults)
    }

    /// Feature vector for a flow
    ///
    /// Flows with fewer than 2 packets have no meaningful statistics;
    /// with `use_defaults` they get the duration floor and zeroed spread
    /// terms, otherwise `None`.
    pub fn features_with(&self, key: &FlowKey, use_defaults: bool) -> Option<FeatureVector> {
        let record = self.flows.get(key)?;

        if record.total_packets < 2 && !use_defaults {
            return None;
        }

        let duration = if record.total_packets < 2 {
            DURATION_EPSILON
        } else {
            record.last_seen - record.start_time
        };

        let fwd = record.fwd_packets as f64;
        let bwd = record.total_packets.saturating_sub(record.fwd_packets) as f64;

        let (iat_mean, iat_std) = mean_std(record.inter_arrival_times.iter().copied());
        let (len_mean, len_std) = mean_std(record.packet_sizes.iter().map(|&s| s as f64));

        let pps = if duration > 0.0 {
            record.total_packets as f64 / duration
        } else {
            0.0
        };

        Some(FeatureVector::new([
            duration, fwd, bwd, iat_mean, iat_std, len_mean, len_std, pps,
        ]))
    }

    /// Drop flows idle longer than the configured timeout
    ///
    /// Returns how many flows were evicted.
    pub fn evict_stale(&mut self, now: f64) -> usize {
        let timeout = self.config.flow_timeout_secs;
        let before = self.flows.len();
        self.flows.retain(|_, record| now - record.last_seen <= timeout);
        let evicted = before - self.flows.len();

        if evicted > 0 {
            debug!("Evicted {} stale flows", evicted);
            self.stats.flows_evicted += evicted as u64;
        }
        self.stats.active_flows = self.flows.len();
        evicted
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.flows.get(key)
    }

    pub fn active_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }
}

/// Mean and sample standard deviation (n-1); both 0 when n < 2
fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let n = values.clone().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}
