use crate::config::OnnxConfig;
use crate::diagnosis::Label;
use crate::image::{FeatureVector, FEATURE_VECTOR_LENGTH};
use crate::models::Predictor;
use crate::utils::error::ScanError;
use crate::Result;
use ndarray::Axis;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::Path;

/// 通过 ONNX Runtime 执行的分类器（例如由 skl2onnx 导出的 SVC）
pub struct OnnxPredictor {
    session: Mutex<Session>,
    input_name: String,
    output_name: String, // 动态发现的输出名称
}

impl OnnxPredictor {
    pub fn load(model_path: &Path, config: &OnnxConfig) -> Result<Self> {
        tracing::info!("Loading ONNX classifier from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(Self::optimization_level(config.optimization_level))?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(model_path)?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(ScanError::CorruptArtifact(
                    "ONNX classifier has no inputs".to_string(),
                ))
            }
        };

        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(ScanError::CorruptArtifact(
                    "ONNX classifier has no outputs".to_string(),
                ))
            }
        };

        // 记录所有可用输出用于调试
        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Classifier output[{}]: '{}'", i, output.name);
        }
        tracing::info!(
            "ONNX classifier ready: input='{}', output='{}'",
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    fn optimization_level(level: i32) -> GraphOptimizationLevel {
        match level {
            i32::MIN..=0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        }
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, features: &FeatureVector) -> Result<Label> {
        // 添加batch维度 [1, 40000]
        let input = features.as_array().clone().insert_axis(Axis(0));
        debug_assert_eq!(input.shape(), &[1, FEATURE_VECTOR_LENGTH]);

        let input_tensor = Tensor::from_array(input).map_err(inference_error)?;

        let class = {
            let mut session = self.session.lock();
            let outputs = session
                .run(inputs![self.input_name.as_str() => input_tensor])
                .map_err(inference_error)?;

            let output = match outputs.get(&self.output_name) {
                Some(output) => output,
                None => {
                    let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                    return Err(ScanError::Internal(format!(
                        "Classifier output '{}' not found. Available outputs: {:?}",
                        self.output_name, available
                    )));
                }
            };

            // 标签输出是 int64；也兼容输出分数或概率的模型
            let class = match output.try_extract_array::<i64>() {
                Ok(labels) => {
                    let labels: Vec<i64> = labels.iter().copied().collect();
                    class_from_labels(&labels)
                }
                Err(_) => {
                    let scores = output.try_extract_array::<f32>().map_err(inference_error)?;
                    let values: Vec<f32> = scores.iter().copied().collect();
                    class_from_scores(scores.shape(), &values)
                }
            };
            class
        }?;

        Label::from_class(class)
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}

fn inference_error(err: ort::Error) -> ScanError {
    ScanError::Internal(format!("ONNX inference failed: {}", err))
}

/// int64 标签张量：取第一个样本的类别
fn class_from_labels(labels: &[i64]) -> Result<i64> {
    labels.first().copied().ok_or_else(|| {
        ScanError::CorruptArtifact("classifier returned an empty label tensor".to_string())
    })
}

/// f32 输出按最后一维解码：
/// 1 列为正类分数（阈值 0.5），2 列为每类概率（取较大者）。
fn class_from_scores(shape: &[usize], scores: &[f32]) -> Result<i64> {
    let columns = shape.last().copied().unwrap_or(1);
    match (columns, scores) {
        (1, [score, ..]) => Ok(i64::from(*score > 0.5)),
        (2, [negative, positive, ..]) => Ok(i64::from(positive > negative)),
        (_, []) => Err(ScanError::CorruptArtifact(
            "classifier returned an empty score tensor".to_string(),
        )),
        _ => Err(ScanError::CorruptArtifact(format!(
            "classifier score tensor has unsupported shape {:?}",
            shape
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimization_levels_are_clamped() {
        assert!(matches!(
            OnnxPredictor::optimization_level(-3),
            GraphOptimizationLevel::Disable
        ));
        assert!(matches!(
            OnnxPredictor::optimization_level(2),
            GraphOptimizationLevel::Level2
        ));
        assert!(matches!(
            OnnxPredictor::optimization_level(99),
            GraphOptimizationLevel::Level3
        ));
    }

    #[test]
    fn label_tensor_yields_first_class() {
        assert_eq!(class_from_labels(&[1]).unwrap(), 1);
        assert_eq!(class_from_labels(&[0, 1]).unwrap(), 0);
        assert!(matches!(
            class_from_labels(&[]),
            Err(ScanError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn single_score_is_thresholded() {
        assert_eq!(class_from_scores(&[1, 1], &[0.8]).unwrap(), 1);
        assert_eq!(class_from_scores(&[1, 1], &[0.2]).unwrap(), 0);
        assert_eq!(class_from_scores(&[1, 1], &[0.5]).unwrap(), 0);
        assert_eq!(class_from_scores(&[1], &[0.7]).unwrap(), 1);
    }

    #[test]
    fn probability_pair_picks_the_larger_class() {
        // [P(no tumor), P(tumor)]
        assert_eq!(class_from_scores(&[1, 2], &[0.9, 0.1]).unwrap(), 0);
        assert_eq!(class_from_scores(&[1, 2], &[0.3, 0.7]).unwrap(), 1);
        assert_eq!(class_from_scores(&[1, 2], &[-1.5, 2.0]).unwrap(), 1);
    }

    #[test]
    fn malformed_scores_are_corrupt_artifact() {
        assert!(matches!(
            class_from_scores(&[1, 0], &[]),
            Err(ScanError::CorruptArtifact(_))
        ));
        assert!(matches!(
            class_from_scores(&[1, 3], &[0.2, 0.3, 0.5]),
            Err(ScanError::CorruptArtifact(_))
        ));
    }
}
