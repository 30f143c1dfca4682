//! Capture engine
//!
//! Pulls raw frames from a `PacketSource`, folds them into flows,
//! classifies each packet, and emits `PacketRecord`s.
//!
//! # Architecture
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ PacketSource │────▶│ Flow Tracker │────▶│  Classifier  │
//! │ (pcap/file)  │     │  (features)  │     │ (model/rule) │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                                                  │
//!                                                  ▼
//!                                           ┌──────────────┐
//!                                           │ PacketRecord │
//!                                           │   channel    │
//!                                           └──────────────┘
//! ```

pub mod capture;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{HeuristicClassifier, KMeansClassifier};
use crate::config::Config;
use crate::core::parser::parse_frame;
use crate::core::record::{Classification, PacketRecord};
use crate::error::{Error, Result};
use crate::flow::FlowTracker;
use crate::model;

pub use capture::{CaptureConfig, FileSource, LiveSource, PacketSource};

/// Engine counters, shared with the stats reporter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Packets that made it through parsing and classification
    pub packets_processed: u64,
    /// Frames dropped (non-IP or unparseable)
    pub packets_dropped: u64,
    /// Packets labeled normal
    pub normal: u64,
    /// Packets labeled anomalous
    pub anomalous: u64,
    /// Verdicts from the clustering model
    pub model_decisions: u64,
    /// Verdicts from the rule-based fallback
    pub heuristic_decisions: u64,
    /// Flows currently tracked
    pub flows_active: usize,
    /// Flows evicted by timeout sweeps
    pub flows_evicted: u64,
}

/// Capture and classification engine
pub struct Engine {
    tracker: FlowTracker,
    heuristic: HeuristicClassifier,
    kmeans: KMeansClassifier,
    cleanup_interval: u64,
    stats: Arc<RwLock<EngineStats>>,
    running: Arc<AtomicBool>,
    seq: u64,
    epoch: Instant,
}

impl Engine {
    /// Build an engine from config, loading model artifacts
    ///
    /// Fails if an artifact is missing; the engine never starts without
    /// its configured model.
    pub fn new(config: &Config) -> Result<Self> {
        let kmeans = model::load_classifier(&config.model)?;
        Ok(Self::with_classifier(config, kmeans))
    }

    /// Build an engine around an already-assembled classifier
    pub fn with_classifier(config: &Config, kmeans: KMeansClassifier) -> Self {
        Self {
            tracker: FlowTracker::new(config.flow.clone()),
            heuristic: HeuristicClassifier::new(config.heuristic.clone()),
            kmeans,
            cleanup_interval: config.flow.cleanup_interval,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            running: Arc::new(AtomicBool::new(true)),
            seq: 0,
            epoch: Instant::now(),
        }
    }

    /// Shared stats handle for the reporter task
    pub fn stats_handle(&self) -> Arc<RwLock<EngineStats>> {
        self.stats.clone()
    }

    /// Shared run flag; store `false` to stop the capture loop
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Snapshot of the current counters
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    /// Drive the capture loop until stopped or the source runs dry
    ///
    /// Emitted records go out on `tx`; a closed receiver also stops the
    /// loop.
    pub fn run(mut self, mut source: Box<dyn PacketSource>, tx: Sender<PacketRecord>) -> Result<()> {
        info!("Capture engine started");

        while self.running.load(Ordering::SeqCst) {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    if source.is_exhausted() {
                        info!("Packet source exhausted");
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!("Capture error: {}", e);
                    return Err(e);
                }
            };

            if let Some(record) = self.process_frame(&frame) {
                if tx.send(record).is_err() {
                    debug!("Record receiver closed, stopping");
                    break;
                }
            }
        }

        info!("Capture engine stopped");
        Ok(())
    }

    /// Process one raw frame into a record
    ///
    /// Returns `None` for frames that do not reach classification
    /// (non-IP, unparseable).
    pub fn process_frame(&mut self, frame: &[u8]) -> Option<PacketRecord> {
        let meta = match parse_frame(frame) {
            Ok(meta) => meta,
            Err(Error::NoIpLayer) => {
                self.stats.write().packets_dropped += 1;
                return None;
            }
            Err(e) => {
                debug!("Unparseable frame: {}", e);
                self.stats.write().packets_dropped += 1;
                return None;
            }
        };

        self.seq += 1;
        let timestamp = round_us(self.epoch.elapsed().as_secs_f64());

        let key = self.tracker.observe(&meta, timestamp);

        let classification = match self.tracker.features(&key) {
            Some(features) => match self.kmeans.classify(&features) {
                Ok(c) => {
                    self.stats.write().model_decisions += 1;
                    c
                }
                Err(e) => {
                    debug!("Model error, falling back: {}", e);
                    let label = self.heuristic.classify(
                        meta.length,
                        meta.src_port,
                        meta.dst_port,
                        meta.protocol,
                    );
                    self.stats.write().heuristic_decisions += 1;
                    Classification::new(label, "Heuristic (K-Means error)")
                }
            },
            None => {
                let label = self.heuristic.classify(
                    meta.length,
                    meta.src_port,
                    meta.dst_port,
                    meta.protocol,
                );
                self.stats.write().heuristic_decisions += 1;
                Classification::new(label, "Heuristic (fallback)")
            }
        };

        if self.cleanup_interval > 0 && self.seq % self.cleanup_interval == 0 {
            let evicted = self.tracker.evict_stale(timestamp);
            self.stats.write().flows_evicted += evicted as u64;
        }

        {
            let mut stats = self.stats.write();
            stats.packets_processed += 1;
            match classification.label {
                crate::core::record::Label::Normal => stats.normal += 1,
                crate::core::record::Label::Anomalous => stats.anomalous += 1,
            }
            stats.flows_active = self.tracker.active_flows();
        }

        Some(PacketRecord {
            seq: self.seq,
            timestamp,
            src_ip: meta.src_ip,
            dst_ip: meta.dst_ip,
            protocol: meta.protocol.to_string(),
            length: meta.length,
            info: meta.info(),
            classification,
        })
    }
}

/// Round to microsecond precision
fn round_us(secs: f64) -> f64 {
    (secs * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClusterMapping, ClusterModel, Scaler};
    use crate::core::record::Label;
    use std::collections::VecDeque;

    struct IdentityScaler;

    impl Scaler for IdentityScaler {
        fn transform(&self, features: &[f64]) -> Result<Vec<f64>> {
            Ok(features.to_vec())
        }
    }

    struct FixedModel(usize);

    impl ClusterModel for FixedModel {
        fn predict(&self, _features: &[f64]) -> Result<usize> {
            Ok(self.0)
        }
    }

    struct FailingModel;

    impl ClusterModel for FailingModel {
        fn predict(&self, _features: &[f64]) -> Result<usize> {
            Err(Error::EmptyModel)
        }
    }

    /// Source that replays a fixed list of frames
    struct ScriptedSource {
        frames: VecDeque<Vec<u8>>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Vec<u8>>) -> Self {
            Self { frames: frames.into() }
        }
    }

    impl PacketSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(self.frames.pop_front())
        }

        fn is_exhausted(&self) -> bool {
            self.frames.is_empty()
        }
    }

    fn make_tcp_frame(src_port: u16, dst_port: u16, payload_len: usize) -> Vec<u8> {
        let total_len = 40 + payload_len;
        let mut pkt = vec![
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
            0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb,
            0x08, 0x00,
        ];
        pkt.extend_from_slice(&[0x45, 0x00]);
        pkt.extend_from_slice(&(total_len as u16).to_be_bytes());
        pkt.extend_from_slice(&[
            0x12, 0x34,
            0x40, 0x00,
            0x40,
            0x06,
            0x00, 0x00,
            10, 0, 0, 1,
            10, 0, 0, 2,
        ]);
        pkt.extend_from_slice(&src_port.to_be_bytes());
        pkt.extend_from_slice(&dst_port.to_be_bytes());
        pkt.extend_from_slice(&[
            0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x00,
            0x50, 0x10,
            0xff, 0xff,
            0x00, 0x00,
            0x00, 0x00,
        ]);
        pkt.extend(std::iter::repeat(0u8).take(payload_len));
        pkt
    }

    fn engine_with_model(model: Box<dyn ClusterModel>) -> Engine {
        let config = Config::default();
        let kmeans = KMeansClassifier::new(
            Box::new(IdentityScaler),
            model,
            ClusterMapping::default(),
        );
        Engine::with_classifier(&config, kmeans)
    }

    #[test]
    fn test_process_frame_emits_record() {
        let mut engine = engine_with_model(Box::new(FixedModel(1)));

        let record = engine.process_frame(&make_tcp_frame(4444, 80, 20)).unwrap();
        assert_eq!(record.seq, 1);
        assert_eq!(record.protocol, "TCP");
        assert_eq!(record.info, "4444 -> 80 [TCP]");
        assert_eq!(record.classification.label, Label::Normal);
        assert_eq!(record.classification.method, "K-Means (C1)");
        assert_eq!(record.length, 74);
    }

    #[test]
    fn test_model_error_falls_back_to_heuristic() {
        let mut engine = engine_with_model(Box::new(FailingModel));

        let record = engine.process_frame(&make_tcp_frame(4444, 80, 20)).unwrap();
        assert_eq!(record.classification.method, "Heuristic (K-Means error)");
        // 74 bytes from a plain port pair scores 0.0
        assert_eq!(record.classification.label, Label::Normal);

        let stats = engine.stats();
        assert_eq!(stats.heuristic_decisions, 1);
        assert_eq!(stats.model_decisions, 0);
    }

    #[test]
    fn test_non_ip_frame_is_dropped() {
        let mut engine = engine_with_model(Box::new(FixedModel(1)));

        // ARP frame
        let mut arp = vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb,
            0x08, 0x06,
        ];
        arp.extend_from_slice(&[0u8; 28]);

        assert!(engine.process_frame(&arp).is_none());
        let stats = engine.stats();
        assert_eq!(stats.packets_dropped, 1);
        assert_eq!(stats.packets_processed, 0);
    }

    #[test]
    fn test_sequence_numbers_are_monotonic() {
        let mut engine = engine_with_model(Box::new(FixedModel(1)));

        for expected in 1..=5 {
            let record = engine.process_frame(&make_tcp_frame(4444, 80, 20)).unwrap();
            assert_eq!(record.seq, expected);
        }
    }

    #[test]
    fn test_run_drains_scripted_source() {
        let engine = engine_with_model(Box::new(FixedModel(1)));
        let stats = engine.stats_handle();

        let frames = (0..10).map(|i| make_tcp_frame(4444, 80, i * 10)).collect();
        let source = ScriptedSource::new(frames);

        let (tx, rx) = crossbeam_channel::unbounded();
        engine.run(Box::new(source), tx).unwrap();

        let records: Vec<_> = rx.try_iter().collect();
        assert_eq!(records.len(), 10);
        assert_eq!(stats.read().packets_processed, 10);
        assert_eq!(stats.read().flows_active, 1);
    }

    #[test]
    fn test_run_stops_when_flag_cleared() {
        let engine = engine_with_model(Box::new(FixedModel(1)));
        let running = engine.running_handle();
        running.store(false, Ordering::SeqCst);

        let source = ScriptedSource::new(vec![make_tcp_frame(4444, 80, 20)]);
        let (tx, rx) = crossbeam_channel::unbounded();
        engine.run(Box::new(source), tx).unwrap();

        assert_eq!(rx.try_iter().count(), 0);
    }
}
