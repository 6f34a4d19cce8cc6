use crate::utils::error::ScanError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, GenericImageView, ImageFormat};

/// 默认单张图像大小上限（与 ServerConfig 保持一致）
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串加载图像
    pub fn from_base64(base64_data: &str, max_bytes: usize) -> Result<DynamicImage> {
        // 检测并移除可能的数据URL前缀 (data:image/xxx;base64,)
        let base64_clean = if base64_data.starts_with("data:") {
            base64_data.split(',').nth(1).unwrap_or(base64_data)
        } else {
            base64_data
        };

        let image_bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?;

        Self::from_bytes(&image_bytes, max_bytes)
    }

    /// 从字节流加载图像
    pub fn from_bytes(bytes: &[u8], max_bytes: usize) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(ScanError::InvalidImage("empty upload".to_string()));
        }

        if bytes.len() > max_bytes {
            return Err(ScanError::FileTooLarge(bytes.len(), max_bytes));
        }

        let format = Self::detect_format(bytes)
            .ok_or_else(|| ScanError::InvalidImage("unrecognized image data".to_string()))?;

        if !Self::is_supported_format(format) {
            return Err(ScanError::UnsupportedFormat(format!("{:?}", format)));
        }

        let image = image::load_from_memory_with_format(bytes, format)?;
        Self::validate_dimensions(&image)?;

        tracing::debug!(
            "Decoded {:?} image: {}x{} ({:?})",
            format,
            image.width(),
            image.height(),
            image.color()
        );

        Ok(image)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Tiff
                | ImageFormat::WebP
        )
    }

    /// 验证图像尺寸（宽高都必须非零）
    pub fn validate_dimensions(image: &DynamicImage) -> Result<()> {
        let (width, height) = image.dimensions();

        if width == 0 || height == 0 {
            return Err(ScanError::InvalidImage(format!(
                "Image has zero extent: {}x{}",
                width, height
            )));
        }

        Ok(())
    }
}
