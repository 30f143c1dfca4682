//! Model-backed classifier
//!
//! Scales a flow feature vector, asks the clustering model for the
//! nearest cluster, and maps the cluster id to a verdict. The scaler and
//! model sit behind traits so tests can substitute doubles.

use std::collections::HashMap;

use crate::core::record::{Classification, Label};
use crate::error::Result;
use crate::flow::FeatureVector;

/// Feature scaling applied before cluster assignment
pub trait Scaler: Send + Sync {
    /// Scale a raw feature vector into model space
    fn transform(&self, features: &[f64]) -> Result<Vec<f64>>;
}

/// Cluster assignment
pub trait ClusterModel: Send + Sync {
    /// Index of the cluster nearest to the (scaled) feature vector
    fn predict(&self, features: &[f64]) -> Result<usize>;
}

/// Maps cluster ids to verdicts
///
/// Clusters without an explicit mapping are treated as anomalous.
#[derive(Debug, Clone)]
pub struct ClusterMapping {
    labels: HashMap<usize, Label>,
}

impl Default for ClusterMapping {
    fn default() -> Self {
        let mut labels = HashMap::new();
        labels.insert(0, Label::Anomalous);
        labels.insert(1, Label::Normal);
        labels.insert(2, Label::Anomalous);
        Self { labels }
    }
}

impl ClusterMapping {
    pub fn new(labels: HashMap<usize, Label>) -> Self {
        Self { labels }
    }

    pub fn label_for(&self, cluster: usize) -> Label {
        self.labels.get(&cluster).copied().unwrap_or(Label::Anomalous)
    }
}

/// Two-stage classifier: scaler, cluster model, cluster-to-label mapping
pub struct KMeansClassifier {
    scaler: Box<dyn Scaler>,
    model: Box<dyn ClusterModel>,
    mapping: ClusterMapping,
}

impl std::fmt::Debug for KMeansClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KMeansClassifier")
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

impl KMeansClassifier {
    pub fn new(
        scaler: Box<dyn Scaler>,
        model: Box<dyn ClusterModel>,
        mapping: ClusterMapping,
    ) -> Self {
        Self { scaler, model, mapping }
    }

    /// Classify a flow feature vector
    pub fn classify(&self, features: &FeatureVector) -> Result<Classification> {
        let scaled = self.scaler.transform(features.as_slice())?;
        let cluster = self.model.predict(&scaled)?;
        let label = self.mapping.label_for(cluster);
        Ok(Classification::new(label, format!("K-Means (C{})", cluster)))
    }
}
