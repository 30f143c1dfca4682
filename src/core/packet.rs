//! Per-packet metadata
//!
//! `PacketMeta` is the result of extracting the layer 3/4 fields the
//! pipeline cares about from a raw frame. Everything downstream (flow
//! tracking, classification, emitted records) works from this snapshot.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Transport protocol of an IP packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpProtocol {
    Tcp,
    Udp,
    /// Any other IP protocol, identified by its protocol number
    Other(u8),
}

impl From<u8> for IpProtocol {
    fn from(val: u8) -> Self {
        match val {
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            other => IpProtocol::Other(other),
        }
    }
}

impl From<IpProtocol> for u8 {
    fn from(val: IpProtocol) -> Self {
        match val {
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Other(v) => v,
        }
    }
}

impl std::fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpProtocol::Tcp => write!(f, "TCP"),
            IpProtocol::Udp => write!(f, "UDP"),
            // Non-TCP/UDP traffic is reported by its raw protocol number
            IpProtocol::Other(n) => write!(f, "{}", n),
        }
    }
}

/// Extracted layer 3/4 metadata of a single captured packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketMeta {
    /// Source IP address
    pub src_ip: IpAddr,
    /// Destination IP address
    pub dst_ip: IpAddr,
    /// Transport protocol
    pub protocol: IpProtocol,
    /// Source port (0 for non-TCP/UDP)
    pub src_port: u16,
    /// Destination port (0 for non-TCP/UDP)
    pub dst_port: u16,
    /// Total captured frame length in bytes
    pub length: u32,
}

impl PacketMeta {
    /// Short port/protocol summary shown alongside each record
    pub fn info(&self) -> String {
        format!("{} -> {} [{}]", self.src_port, self.dst_port, self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_protocol_roundtrip() {
        assert_eq!(IpProtocol::from(6), IpProtocol::Tcp);
        assert_eq!(IpProtocol::from(17), IpProtocol::Udp);
        assert_eq!(IpProtocol::from(1), IpProtocol::Other(1));
        assert_eq!(u8::from(IpProtocol::Tcp), 6);
        assert_eq!(u8::from(IpProtocol::Other(47)), 47);
    }

    #[test]
    fn test_protocol_display() {
        assert_eq!(IpProtocol::Tcp.to_string(), "TCP");
        assert_eq!(IpProtocol::Udp.to_string(), "UDP");
        assert_eq!(IpProtocol::Other(1).to_string(), "1");
    }

    #[test]
    fn test_info_string() {
        let meta = PacketMeta {
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            protocol: IpProtocol::Tcp,
            src_port: 4444,
            dst_port: 80,
            length: 60,
        };
        assert_eq!(meta.info(), "4444 -> 80 [TCP]");
    }
}
