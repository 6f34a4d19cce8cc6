use crate::image::transforms::ImageTransforms;
use crate::image::loader::ImageLoader;
use crate::utils::error::ScanError;
use crate::Result;
use image::{DynamicImage, GrayImage};
use ndarray::Array1;

/// 模型输入边长（训练时的图像尺寸）
pub const INPUT_SIDE: u32 = 200;

/// 特征向量长度 200*200
pub const FEATURE_VECTOR_LENGTH: usize = (INPUT_SIDE * INPUT_SIDE) as usize;

/// 归一化、按行展开的灰度像素，长度恒为 `FEATURE_VECTOR_LENGTH`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Array1<f32>);

impl FeatureVector {
    pub fn from_vec(values: Vec<f32>) -> Result<Self> {
        if values.len() != FEATURE_VECTOR_LENGTH {
            return Err(ScanError::InvalidImage(format!(
                "feature vector must have {} values, got {}",
                FEATURE_VECTOR_LENGTH,
                values.len()
            )));
        }
        Ok(Self(Array1::from_vec(values)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_array(&self) -> &Array1<f32> {
        &self.0
    }

    pub fn as_slice(&self) -> &[f32] {
        // Array1::from_vec 总是标准布局
        self.0.as_slice().unwrap_or(&[])
    }
}

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 训练一致的预处理流水线：灰度 → 200x200 → 行优先展开 → /255
    pub fn feature_vector(image: &DynamicImage) -> Result<FeatureVector> {
        ImageLoader::validate_dimensions(image)?;

        // 1. 灰度
        let gray = ImageTransforms::to_grayscale(image);

        // 2. 缩放（拉伸，不保持宽高比）
        let resized = ImageTransforms::resize_bilinear(&gray, INPUT_SIDE, INPUT_SIDE)?;

        // 3 + 4. 展开并归一化
        Self::flatten_normalized(&resized)
    }

    /// 行优先展开并除以 255
    pub fn flatten_normalized(image: &GrayImage) -> Result<FeatureVector> {
        // GrayImage 的底层缓冲区本身就是行优先排列
        let values = image
            .as_raw()
            .iter()
            .map(|&pixel| pixel as f32 / 255.0)
            .collect();

        FeatureVector::from_vec(values)
    }
}
