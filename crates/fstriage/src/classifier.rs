//! Demo classifier over inventory metadata
//!
//! Consumes [`FileRecord`] metadata only, never file content. A standard
//! scaler feeds a logistic regression fitted by batch gradient descent. The
//! whole module is a peripheral sink: when the `classifier` feature is off or
//! the input cannot support a fit, [`train`] returns
//! [`ClassifierOutcome::Unavailable`] instead of failing.

use crate::error::{Result, TriageError};
use crate::types::FileRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const FEATURE_COUNT: usize = 4;
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["log_size", "is_text", "is_image", "is_pdf"];

const ITERATIONS: usize = 200;
const LEARNING_RATE: f64 = 0.5;
/// Inverse regularization strength
const C: f64 = 1.0;

pub type Features = [f64; FEATURE_COUNT];

/// `[ln(1 + size), text/*, image/*, application/pdf]`
pub fn features_from_record(record: &FileRecord) -> Features {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    [
        (record.size as f64).ln_1p(),
        flag(record.mime.starts_with("text/")),
        flag(record.mime.starts_with("image/")),
        flag(record.mime == "application/pdf"),
    ]
}

/// Illustrative label: images and PDFs are "documents of interest".
pub fn demo_label(record: &FileRecord) -> bool {
    record.mime.starts_with("image/") || record.mime == "application/pdf"
}

/// Per-feature standardization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Features,
    pub scale: Features,
}

impl StandardScaler {
    pub fn fit(samples: &[Features]) -> Self {
        let n = samples.len().max(1) as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for sample in samples {
            for (m, x) in mean.iter_mut().zip(sample) {
                *m += x / n;
            }
        }
        let mut scale = [0.0; FEATURE_COUNT];
        for sample in samples {
            for ((s, x), m) in scale.iter_mut().zip(sample).zip(&mean) {
                *s += (x - m).powi(2) / n;
            }
        }
        for s in scale.iter_mut() {
            *s = s.sqrt();
            // Constant feature
            if *s == 0.0 {
                *s = 1.0;
            }
        }
        Self { mean, scale }
    }

    pub fn transform(&self, sample: &Features) -> Features {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = (sample[i] - self.mean[i]) / self.scale[i];
        }
        out
    }
}

/// Binary logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Features,
    pub bias: f64,
}

impl LogisticRegression {
    /// Fit with L2-regularized batch gradient descent.
    pub fn fit(samples: &[Features], labels: &[bool]) -> Self {
        let n = samples.len().max(1) as f64;
        let mut model = Self {
            weights: [0.0; FEATURE_COUNT],
            bias: 0.0,
        };

        for _ in 0..ITERATIONS {
            let mut grad_w = [0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for (x, &y) in samples.iter().zip(labels) {
                let err = model.probability(x) - if y { 1.0 } else { 0.0 };
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi;
                }
                grad_b += err;
            }
            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                let penalty = *w / (C * n);
                *w -= LEARNING_RATE * (g / n + penalty);
            }
            model.bias -= LEARNING_RATE * grad_b / n;
        }
        model
    }

    pub fn probability(&self, x: &Features) -> f64 {
        let z = self
            .weights
            .iter()
            .zip(x)
            .map(|(w, xi)| w * xi)
            .sum::<f64>()
            + self.bias;
        1.0 / (1.0 + (-z).exp())
    }
}

/// Scaler + classifier, plus training diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub classifier: LogisticRegression,
    pub samples: usize,
    pub positives: usize,
    pub training_accuracy: f64,
}

impl TrainedModel {
    pub fn predict_proba(&self, record: &FileRecord) -> f64 {
        let x = self.scaler.transform(&features_from_record(record));
        self.classifier.probability(&x)
    }

    pub fn predict(&self, record: &FileRecord) -> bool {
        self.predict_proba(record) >= 0.5
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TriageError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| TriageError::io(path, e))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| TriageError::io(path, e))?;
        serde_json::from_str(&json)
            .map_err(|e| TriageError::Classifier(format!("{}: {}", path.display(), e)))
    }
}

/// Result of a training request
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutcome {
    Trained(TrainedModel),
    Unavailable { reason: String },
}

impl ClassifierOutcome {
    fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        debug!(%reason, "Classifier unavailable");
        Self::Unavailable { reason }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self, Self::Trained(_))
    }
}

/// Fit a model on `records` with one label per record, optionally saving it
/// as JSON to `model_path`.
pub fn train(
    records: &[FileRecord],
    labels: &[bool],
    model_path: Option<&Path>,
) -> Result<ClassifierOutcome> {
    if !cfg!(feature = "classifier") {
        return Ok(ClassifierOutcome::unavailable(
            "built without the `classifier` feature",
        ));
    }
    if records.is_empty() {
        return Ok(ClassifierOutcome::unavailable("no records"));
    }
    if records.len() != labels.len() {
        return Ok(ClassifierOutcome::unavailable(format!(
            "{} records but {} labels",
            records.len(),
            labels.len()
        )));
    }
    let positives = labels.iter().filter(|&&y| y).count();
    if positives == 0 || positives == labels.len() {
        return Ok(ClassifierOutcome::unavailable(
            "labels contain a single class",
        ));
    }

    let raw: Vec<Features> = records.iter().map(features_from_record).collect();
    let scaler = StandardScaler::fit(&raw);
    let scaled: Vec<Features> = raw.iter().map(|x| scaler.transform(x)).collect();
    let classifier = LogisticRegression::fit(&scaled, labels);

    let correct = scaled
        .iter()
        .zip(labels)
        .filter(|(x, &y)| (classifier.probability(x) >= 0.5) == y)
        .count();

    let model = TrainedModel {
        feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        scaler,
        classifier,
        samples: records.len(),
        positives,
        training_accuracy: correct as f64 / records.len() as f64,
    };

    if let Some(path) = model_path {
        model.save(path)?;
        info!(
            path = %path.display(),
            samples = model.samples,
            accuracy = model.training_accuracy,
            "Saved demo model"
        );
    }

    Ok(ClassifierOutcome::Trained(model))
}
