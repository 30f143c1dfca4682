//! Packet sources
//!
//! Abstracts where raw frames come from: a live interface or a pcap
//! file replay. The engine only sees the `PacketSource` trait, so tests
//! can feed scripted frames.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

fn default_filter() -> String {
    "ip".to_string()
}

fn default_snaplen() -> i32 {
    65535
}

fn default_timeout_ms() -> i32 {
    500
}

fn default_buffer_size() -> usize {
    10_000
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Interface name; the first suitable device when unset
    #[serde(default)]
    pub interface: Option<String>,

    /// BPF filter applied to the capture
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Snapshot length
    #[serde(default = "default_snaplen")]
    pub snaplen: i32,

    /// Read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i32,

    /// Enable promiscuous mode
    #[serde(default)]
    pub promiscuous: bool,

    /// Record channel capacity
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            filter: default_filter(),
            snaplen: default_snaplen(),
            timeout_ms: default_timeout_ms(),
            promiscuous: false,
            buffer_size: default_buffer_size(),
        }
    }
}

/// Source of raw ethernet frames
///
/// `Ok(None)` means nothing is available right now; the engine should
/// poll again unless `is_exhausted` reports the source is done.
pub trait PacketSource: Send {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;

    /// True once the source can never yield another frame
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Live capture on a network interface
pub struct LiveSource {
    cap: pcap::Capture<pcap::Active>,
}

impl LiveSource {
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let device = match &config.interface {
            Some(name) => pcap::Device::list()?
                .into_iter()
                .find(|d| &d.name == name)
                .ok_or_else(|| Error::Config(format!("interface not found: {}", name)))?,
            None => pcap::Device::lookup()?
                .ok_or_else(|| Error::Config("no capture device available".to_string()))?,
        };

        info!("Opening capture on {} (filter: {:?})", device.name, config.filter);

        let mut cap = pcap::Capture::from_device(device)?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(config.timeout_ms)
            .immediate_mode(true)
            .open()?;
        cap.filter(&config.filter, true)?;

        Ok(Self { cap })
    }
}

impl PacketSource for LiveSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match self.cap.next_packet() {
            Ok(packet) => Ok(Some(packet.data.to_vec())),
            // Normal read timeout, poll again
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Replay of a recorded pcap file
pub struct FileSource {
    cap: pcap::Capture<pcap::Offline>,
    exhausted: bool,
}

impl FileSource {
    pub fn open(path: &str, filter: &str) -> Result<Self> {
        info!("Replaying pcap file {}", path);
        let mut cap = pcap::Capture::from_file(path)?;
        cap.filter(filter, true)?;
        Ok(Self { cap, exhausted: false })
    }
}

impl PacketSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match self.cap.next_packet() {
            Ok(packet) => Ok(Some(packet.data.to_vec())),
            Err(pcap::Error::NoMorePackets) => {
                self.exhausted = true;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// List capture-capable interfaces on this host
pub fn list_interfaces() -> Result<Vec<String>> {
    let devices = pcap::Device::list()?;
    Ok(devices.into_iter().map(|d| d.name).collect())
}
