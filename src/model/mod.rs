//! Model artifacts
//!
//! Concrete scaler and clustering model backing the model-based
//! classifier, plus their on-disk persistence. Artifacts are bincode
//! files with a JSON metadata sidecar; they are produced by an offline
//! training pipeline and only loaded here.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classify::{ClusterMapping, ClusterModel, KMeansClassifier, Scaler};
use crate::core::record::Label;
use crate::error::{Error, Result};
use crate::flow::NUM_FEATURES;

/// Current artifact format version
pub const ARTIFACT_VERSION: u32 = 1;

fn default_model_path() -> PathBuf {
    PathBuf::from("models/kmeans_model.bin")
}

fn default_scaler_path() -> PathBuf {
    PathBuf::from("models/minmax_scaler.bin")
}

fn default_cluster_labels() -> HashMap<String, Label> {
    let mut labels = HashMap::new();
    labels.insert("0".to_string(), Label::Anomalous);
    labels.insert("1".to_string(), Label::Normal);
    labels.insert("2".to_string(), Label::Anomalous);
    labels
}

/// Model artifact locations and cluster labeling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Clustering model artifact
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Feature scaler artifact
    #[serde(default = "default_scaler_path")]
    pub scaler_path: PathBuf,

    /// Cluster id to verdict mapping (TOML keys are strings)
    #[serde(default = "default_cluster_labels")]
    pub cluster_labels: HashMap<String, Label>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            scaler_path: default_scaler_path(),
            cluster_labels: default_cluster_labels(),
        }
    }
}

impl ModelConfig {
    /// Parse the string-keyed label table into a `ClusterMapping`
    pub fn cluster_mapping(&self) -> Result<ClusterMapping> {
        let mut labels = HashMap::new();
        for (key, label) in &self.cluster_labels {
            let cluster: usize = key.parse().map_err(|_| {
                Error::Config(format!("cluster_labels key is not a cluster id: {:?}", key))
            })?;
            labels.insert(cluster, *label);
        }
        Ok(ClusterMapping::new(labels))
    }
}

/// Sidecar metadata written next to each artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub n_clusters: usize,
    pub n_features: usize,
}

impl ArtifactMeta {
    /// Read the `<artifact>.meta.json` sidecar for an artifact path
    pub fn read_for(artifact: &Path) -> Result<Self> {
        let path = sidecar_path(artifact);
        let file = File::open(&path).map_err(|_| Error::ArtifactMissing { path })?;
        let meta = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Config(format!("bad artifact metadata: {}", e)))?;
        Ok(meta)
    }
}

fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut os = artifact.as_os_str().to_owned();
    os.push(".meta.json");
    PathBuf::from(os)
}

fn write_sidecar(artifact: &Path, n_clusters: usize, n_features: usize) -> Result<()> {
    let meta = ArtifactMeta {
        version: ARTIFACT_VERSION,
        saved_at: Utc::now(),
        n_clusters,
        n_features,
    };
    let file = File::create(sidecar_path(artifact))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &meta)
        .map_err(|e| Error::Config(format!("cannot write artifact metadata: {}", e)))?;
    Ok(())
}

/// Min-max feature scaler: maps each dimension into [0, 1]
///
/// Dimensions with a degenerate (zero-width) range pass through
/// unscaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
}

impl MinMaxScaler {
    pub fn new(data_min: Vec<f64>, data_max: Vec<f64>) -> Self {
        Self { data_min, data_max }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        write_sidecar(path, 0, self.data_min.len())?;
        info!("Saved scaler to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| Error::ArtifactMissing {
            path: path.to_path_buf(),
        })?;
        let mut reader = BufReader::new(file);
        let scaler: Self =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        Ok(scaler)
    }
}

impl Scaler for MinMaxScaler {
    fn transform(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.data_min.len() {
            return Err(Error::InvalidDimension {
                expected: self.data_min.len(),
                got: features.len(),
            });
        }
        let scaled = features
            .iter()
            .zip(self.data_min.iter().zip(&self.data_max))
            .map(|(&x, (&min, &max))| {
                let range = max - min;
                if range == 0.0 {
                    x
                } else {
                    (x - min) / range
                }
            })
            .collect();
        Ok(scaled)
    }
}

/// Pretrained K-Means model: cluster centroids in scaled feature space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansModel {
    pub centroids: Vec<Vec<f64>>,
}

impl KMeansModel {
    pub fn new(centroids: Vec<Vec<f64>>) -> Self {
        Self { centroids }
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        let n_features = self.centroids.first().map(|c| c.len()).unwrap_or(0);
        write_sidecar(path, self.centroids.len(), n_features)?;
        info!("Saved model to {:?} ({} clusters)", path, self.centroids.len());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| Error::ArtifactMissing {
            path: path.to_path_buf(),
        })?;
        let mut reader = BufReader::new(file);
        let model: Self =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        Ok(model)
    }
}

impl ClusterModel for KMeansModel {
    fn predict(&self, features: &[f64]) -> Result<usize> {
        if self.centroids.is_empty() {
            return Err(Error::EmptyModel);
        }

        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (idx, centroid) in self.centroids.iter().enumerate() {
            if centroid.len() != features.len() {
                return Err(Error::InvalidDimension {
                    expected: centroid.len(),
                    got: features.len(),
                });
            }
            // Squared euclidean distance; the sqrt never changes the argmin
            let dist: f64 = centroid
                .iter()
                .zip(features)
                .map(|(c, x)| (c - x).powi(2))
                .sum();
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        Ok(best)
    }
}

/// Load both artifacts and assemble the model-backed classifier
///
/// A missing artifact is fatal: capture must not start without the
/// model it was configured to use.
pub fn load_classifier(config: &ModelConfig) -> Result<KMeansClassifier> {
    let scaler = MinMaxScaler::load(&config.scaler_path)?;
    let model = KMeansModel::load(&config.model_path)?;
    info!(
        "Loaded model artifacts ({} clusters, {} features)",
        model.n_clusters(),
        scaler.data_min.len()
    );
    if scaler.data_min.len() != NUM_FEATURES {
        return Err(Error::InvalidDimension {
            expected: NUM_FEATURES,
            got: scaler.data_min.len(),
        });
    }
    let mapping = config.cluster_mapping()?;
    Ok(KMeansClassifier::new(
        Box::new(scaler),
        Box::new(model),
        mapping,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_minmax_transform() {
        let scaler = MinMaxScaler::new(vec![0.0, 10.0], vec![10.0, 10.0]);
        let scaled = scaler.transform(&[5.0, 42.0]).unwrap();
        assert_eq!(scaled[0], 0.5);
        // Degenerate range passes through
        assert_eq!(scaled[1], 42.0);
    }

    #[test]
    fn test_minmax_dimension_mismatch() {
        let scaler = MinMaxScaler::new(vec![0.0; 8], vec![1.0; 8]);
        let err = scaler.transform(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidDimension { expected: 8, got: 2 }
        ));
    }

    #[test]
    fn test_kmeans_predict_nearest() {
        let model = KMeansModel::new(vec![
            vec![0.0, 0.0],
            vec![10.0, 10.0],
            vec![0.0, 10.0],
        ]);
        assert_eq!(model.predict(&[1.0, 1.0]).unwrap(), 0);
        assert_eq!(model.predict(&[9.0, 9.5]).unwrap(), 1);
        assert_eq!(model.predict(&[0.5, 9.0]).unwrap(), 2);
    }

    #[test]
    fn test_kmeans_empty_model() {
        let model = KMeansModel::new(vec![]);
        assert!(matches!(model.predict(&[1.0]), Err(Error::EmptyModel)));
    }

    #[test]
    fn test_artifact_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kmeans_model.bin");

        let model = KMeansModel::new(vec![vec![1.0; 8], vec![2.0; 8]]);
        model.save(&path).unwrap();

        let loaded = KMeansModel::load(&path).unwrap();
        assert_eq!(loaded.centroids, model.centroids);

        let meta = ArtifactMeta::read_for(&path).unwrap();
        assert_eq!(meta.version, ARTIFACT_VERSION);
        assert_eq!(meta.n_clusters, 2);
        assert_eq!(meta.n_features, 8);
    }

    #[test]
    fn test_missing_artifact_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = ModelConfig {
            model_path: dir.path().join("missing_model.bin"),
            scaler_path: dir.path().join("missing_scaler.bin"),
            cluster_labels: default_cluster_labels(),
        };
        let err = load_classifier(&config).unwrap_err();
        assert!(matches!(err, Error::ArtifactMissing { .. }));
    }

    #[test]
    fn test_load_classifier() {
        let dir = TempDir::new().unwrap();
        let config = ModelConfig {
            model_path: dir.path().join("model.bin"),
            scaler_path: dir.path().join("scaler.bin"),
            cluster_labels: default_cluster_labels(),
        };

        MinMaxScaler::new(vec![0.0; 8], vec![1.0; 8])
            .save(&config.scaler_path)
            .unwrap();
        KMeansModel::new(vec![vec![0.0; 8], vec![1.0; 8]])
            .save(&config.model_path)
            .unwrap();

        let classifier = load_classifier(&config).unwrap();
        let features = crate::flow::FeatureVector::new([0.1; 8]);
        let c = classifier.classify(&features).unwrap();
        assert_eq!(c.method, "K-Means (C0)");
        assert_eq!(c.label, crate::core::record::Label::Anomalous);
    }

    #[test]
    fn test_bad_cluster_key() {
        let mut labels = HashMap::new();
        labels.insert("not-a-number".to_string(), Label::Normal);
        let config = ModelConfig {
            cluster_labels: labels,
            ..Default::default()
        };
        assert!(matches!(config.cluster_mapping(), Err(Error::Config(_))));
    }
}
