//! Packet classification
//!
//! Two tiers: a clustering model over flow features (`kmeans`), with a
//! rule-based scorer (`heuristic`) as the fallback path.

pub mod heuristic;
pub mod kmeans;

pub use heuristic::{HeuristicClassifier, HeuristicConfig};
pub use kmeans::{ClusterMapping, ClusterModel, KMeansClassifier, Scaler};
