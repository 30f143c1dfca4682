//! anomflow - live IP traffic anomaly detection
//!
//! Captures IP traffic, aggregates packets into flows, and classifies
//! each packet with a pretrained clustering model (with a rule-based
//! fallback for flows the model cannot judge yet).

pub mod classify;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod flow;
pub mod model;

pub use config::Config;
pub use self::core::{Classification, Label, PacketRecord};
pub use engine::{Engine, EngineStats};
pub use error::{Error, Result};
