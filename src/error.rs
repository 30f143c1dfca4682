use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("packet parse error: {0}")]
    Parse(String),

    #[error("no IP layer found in packet")]
    NoIpLayer,

    #[error("invalid feature dimension: expected {expected}, got {got}")]
    InvalidDimension { expected: usize, got: usize },

    #[error("clustering model has no centroids")]
    EmptyModel,

    #[error("model artifact not found at {path}: train a model and export it before starting capture")]
    ArtifactMissing { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact decode error: {0}")]
    ArtifactDecode(#[from] bincode::error::DecodeError),

    #[error("artifact encode error: {0}")]
    ArtifactEncode(#[from] bincode::error::EncodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
