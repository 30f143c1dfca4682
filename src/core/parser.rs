//! Raw frame parsing
//!
//! Turns a captured ethernet frame into a `PacketMeta`. Only the fields
//! the analysis pipeline needs are extracted; deeper protocol dissection
//! is out of scope here.

use std::net::IpAddr;

use etherparse::SlicedPacket;

use crate::core::packet::{IpProtocol, PacketMeta};
use crate::error::{Error, Result};

/// Parse a raw ethernet frame into packet metadata
///
/// Non-IP frames (ARP, etc.) return `Error::NoIpLayer`. Ports are 0 for
/// transports other than TCP/UDP.
pub fn parse_frame(data: &[u8]) -> Result<PacketMeta> {
    let sliced = SlicedPacket::from_ethernet(data)
        .map_err(|e| Error::Parse(e.to_string()))?;

    let (src_ip, dst_ip, protocol) = match &sliced.net {
        Some(etherparse::NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            (
                IpAddr::from(header.source_addr()),
                IpAddr::from(header.destination_addr()),
                IpProtocol::from(header.protocol().0),
            )
        }
        Some(etherparse::NetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            (
                IpAddr::from(header.source_addr()),
                IpAddr::from(header.destination_addr()),
                IpProtocol::from(header.next_header().0),
            )
        }
        _ => return Err(Error::NoIpLayer),
    };

    let (src_port, dst_port) = match &sliced.transport {
        Some(etherparse::TransportSlice::Tcp(tcp)) => {
            (tcp.source_port(), tcp.destination_port())
        }
        Some(etherparse::TransportSlice::Udp(udp)) => {
            (udp.source_port(), udp.destination_port())
        }
        _ => (0, 0),
    };

    Ok(PacketMeta {
        src_ip,
        dst_ip,
        protocol,
        src_port,
        dst_port,
        length: data.len() as u32,
    })
}
