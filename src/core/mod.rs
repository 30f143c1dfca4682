//! Core shared types for packet processing
//!
//! - `packet`: per-packet metadata extracted from raw frames
//! - `parser`: ethernet frame parsing
//! - `record`: classified output records

pub mod packet;
pub mod parser;
pub mod record;

pub use packet::{IpProtocol, PacketMeta};
pub use parser::parse_frame;
pub use record::{Classification, Label, PacketRecord};
