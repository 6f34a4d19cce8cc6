use crate::utils::error::ScanError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// 二分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    NoTumor,
    Tumor,
}

impl Label {
    /// 从模型输出的类别编号转换（0 = 无肿瘤，1 = 肿瘤）
    pub fn from_class(class: i64) -> Result<Self> {
        match class {
            0 => Ok(Label::NoTumor),
            1 => Ok(Label::Tumor),
            other => Err(ScanError::CorruptArtifact(format!(
                "predictor produced unknown class {}",
                other
            ))),
        }
    }

    pub fn class_index(&self) -> i64 {
        match self {
            Label::NoTumor => 0,
            Label::Tumor => 1,
        }
    }

    pub fn display_text(&self) -> &'static str {
        match self {
            Label::NoTumor => "🟢 No Tumor Detected",
            Label::Tumor => "🔴 Brain Tumor Detected",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_text())
    }
}

/// 单次诊断处理统计信息
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisStats {
    /// 解码耗时（毫秒）
    pub decode_time_ms: u64,
    /// 预处理耗时（毫秒）
    pub preprocess_time_ms: u64,
    /// 推理耗时（毫秒）
    pub inference_time_ms: u64,
    /// 原图尺寸
    pub source_width: u32,
    pub source_height: u32,
}

/// 完整的诊断结果
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub label: Label,
    pub class_index: i64,
    /// 处理耗时（秒）
    pub processing_time: f32,
    pub report: crate::image::postprocessing::Report,
    pub stats: DiagnosisStats,
}
