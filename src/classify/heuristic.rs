//! Rule-based fallback classifier
//!
//! Scores a packet on simple port and size rules. Used whenever the
//! clustering model cannot produce a verdict (young flow, model error).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::packet::IpProtocol;
use crate::core::record::Label;

fn default_common_tcp_ports() -> HashSet<u16> {
    [80, 443, 22, 21, 23, 25, 53, 110, 143, 993, 995].into_iter().collect()
}

fn default_common_udp_ports() -> HashSet<u16> {
    [53, 67, 68, 123, 161, 162, 514].into_iter().collect()
}

fn default_suspicious_ports() -> HashSet<u16> {
    [1337, 31337, 12345, 54321].into_iter().collect()
}

fn default_min_packet_size() -> u32 {
    20
}

fn default_max_packet_size() -> u32 {
    1500
}

fn default_micro_packet_size() -> u32 {
    64
}

fn default_jumbo_packet_size() -> u32 {
    1400
}

fn default_high_port_cutoff() -> u16 {
    49152
}

fn default_anomaly_threshold() -> f64 {
    1.0
}

/// Tunables for the rule-based classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicConfig {
    /// Well-known TCP service ports treated as benign
    #[serde(default = "default_common_tcp_ports")]
    pub common_tcp_ports: HashSet<u16>,

    /// Well-known UDP service ports treated as benign
    #[serde(default = "default_common_udp_ports")]
    pub common_udp_ports: HashSet<u16>,

    /// Ports with a known malware association
    #[serde(default = "default_suspicious_ports")]
    pub suspicious_ports: HashSet<u16>,

    /// Lower bound of the expected frame size range
    #[serde(default = "default_min_packet_size")]
    pub min_packet_size: u32,

    /// Upper bound of the expected frame size range
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: u32,

    /// Frames below this are mildly unusual
    #[serde(default = "default_micro_packet_size")]
    pub micro_packet_size: u32,

    /// Frames above this are mildly unusual
    #[serde(default = "default_jumbo_packet_size")]
    pub jumbo_packet_size: u32,

    /// Ephemeral port range start
    #[serde(default = "default_high_port_cutoff")]
    pub high_port_cutoff: u16,

    /// Score at or above which a packet is anomalous
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            common_tcp_ports: default_common_tcp_ports(),
            common_udp_ports: default_common_udp_ports(),
            suspicious_ports: default_suspicious_ports(),
            min_packet_size: default_min_packet_size(),
            max_packet_size: default_max_packet_size(),
            micro_packet_size: default_micro_packet_size(),
            jumbo_packet_size: default_jumbo_packet_size(),
            high_port_cutoff: default_high_port_cutoff(),
            anomaly_threshold: default_anomaly_threshold(),
        }
    }
}

/// Rule-based packet scorer
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier {
    config: HeuristicConfig,
}

impl HeuristicClassifier {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    /// Score one packet and map the score to a verdict
    ///
    /// Scoring: +1.0 for a frame size outside the expected range, +1.0
    /// per suspicious port, +0.5 for micro/jumbo frames. At or above the
    /// threshold the packet is anomalous.
    pub fn classify(
        &self,
        size: u32,
        src_port: u16,
        dst_port: u16,
        protocol: IpProtocol,
    ) -> Label {
        let mut score = 0.0_f64;

        if size < self.config.min_packet_size || size > self.config.max_packet_size {
            score += 1.0;
        }

        if self.is_suspicious_port(src_port, protocol) {
            score += 1.0;
        }
        if self.is_suspicious_port(dst_port, protocol) {
            score += 1.0;
        }

        if size < self.config.micro_packet_size || size > self.config.jumbo_packet_size {
            score += 0.5;
        }

        if score >= self.config.anomaly_threshold {
            Label::Anomalous
        } else {
            Label::Normal
        }
    }

    fn is_suspicious_port(&self, port: u16, protocol: IpProtocol) -> bool {
        if self.config.suspicious_ports.contains(&port) {
            return true;
        }
        if port > self.config.high_port_cutoff {
            return true;
        }
        if port < 1024 {
            let common = match protocol {
                IpProtocol::Tcp => &self.config.common_tcp_ports,
                IpProtocol::Udp => &self.config.common_udp_ports,
                IpProtocol::Other(_) => return true,
            };
            return !common.contains(&port);
        }
        false
    }
}
