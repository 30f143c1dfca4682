//! Output records
//!
//! A `PacketRecord` is emitted for every analyzed packet: the extracted
//! metadata plus the classification verdict, ready for display or export.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Classification verdict for a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Normal,
    Anomalous,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Normal => write!(f, "Normal"),
            Label::Anomalous => write!(f, "Anomalous"),
        }
    }
}

/// A verdict together with the method that produced it
///
/// Rendered as `"Normal (K-Means (C1))"` or `"Anomalous (Heuristic (fallback))"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Label,
    /// Human-readable description of the deciding method
    pub method: String,
}

impl Classification {
    pub fn new(label: Label, method: impl Into<String>) -> Self {
        Self { label, method: method.into() }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.method)
    }
}

/// One analyzed packet, as emitted by the capture engine
#[derive(Debug, Clone, Serialize)]
pub struct PacketRecord {
    /// Monotonic sequence number, starting at 1
    pub seq: u64,
    /// Seconds since capture start, rounded to microseconds
    pub timestamp: f64,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    /// Protocol name ("TCP", "UDP", or the raw protocol number)
    pub protocol: String,
    /// Captured frame length in bytes
    pub length: u32,
    /// Port/protocol summary, e.g. "4444 -> 80 [TCP]"
    pub info: String,
    pub classification: Classification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Normal.to_string(), "Normal");
        assert_eq!(Label::Anomalous.to_string(), "Anomalous");
    }

    #[test]
    fn test_classification_display() {
        let c = Classification::new(Label::Normal, "K-Means (C1)");
        assert_eq!(c.to_string(), "Normal (K-Means (C1))");

        let c = Classification::new(Label::Anomalous, "Heuristic (fallback)");
        assert_eq!(c.to_string(), "Anomalous (Heuristic (fallback))");
    }

    #[test]
    fn test_label_serde() {
        assert_eq!(serde_json::to_string(&Label::Anomalous).unwrap(), "\"anomalous\"");
        let back: Label = serde_json::from_str("\"normal\"").unwrap();
        assert_eq!(back, Label::Normal);
    }
}
