use crate::diagnosis::Label;
use crate::image::{FeatureVector, FEATURE_VECTOR_LENGTH};
use crate::models::Predictor;
use crate::utils::error::ScanError;
use crate::Result;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// 线性核 SVM 的序列化形式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvmArtifact {
    pub kind: String,
    pub weights: Vec<f32>,
    pub intercept: f32,
    /// [负类, 正类]
    pub classes: [i64; 2],
}

pub const LINEAR_SVM_KIND: &str = "linear_svm";

/// 线性 SVM：`w·x + b > 0` 判为正类
#[derive(Debug, Clone)]
pub struct LinearSvm {
    weights: Array1<f32>,
    intercept: f32,
    negative: Label,
    positive: Label,
}

impl LinearSvm {
    pub fn new(weights: Vec<f32>, intercept: f32, classes: [i64; 2]) -> Result<Self> {
        if weights.len() != FEATURE_VECTOR_LENGTH {
            return Err(ScanError::CorruptArtifact(format!(
                "expected {} weights, found {}",
                FEATURE_VECTOR_LENGTH,
                weights.len()
            )));
        }
        if !intercept.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(ScanError::CorruptArtifact(
                "model contains non-finite coefficients".to_string(),
            ));
        }

        Ok(Self {
            weights: Array1::from_vec(weights),
            intercept,
            negative: Label::from_class(classes[0])?,
            positive: Label::from_class(classes[1])?,
        })
    }

    /// 从 JSON 读取
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let artifact: LinearSvmArtifact = serde_json::from_reader(reader)?;
        if artifact.kind != LINEAR_SVM_KIND {
            return Err(ScanError::CorruptArtifact(format!(
                "unsupported model kind '{}'",
                artifact.kind
            )));
        }
        Self::new(artifact.weights, artifact.intercept, artifact.classes)
    }

    pub fn to_artifact(&self) -> LinearSvmArtifact {
        LinearSvmArtifact {
            kind: LINEAR_SVM_KIND.to_string(),
            weights: self.weights.to_vec(),
            intercept: self.intercept,
            classes: [self.negative.class_index(), self.positive.class_index()],
        }
    }

    pub fn decision_function(&self, features: &FeatureVector) -> f32 {
        self.weights.dot(features.as_array()) + self.intercept
    }
}

impl Predictor for LinearSvm {
    fn predict(&self, features: &FeatureVector) -> Result<Label> {
        let score = self.decision_function(features);
        tracing::debug!("Linear SVM decision score: {:.6}", score);

        Ok(if score > 0.0 { self.positive } else { self.negative })
    }

    fn kind(&self) -> &'static str {
        LINEAR_SVM_KIND
    }
}
