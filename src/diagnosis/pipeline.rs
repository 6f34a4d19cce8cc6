use crate::{
    diagnosis::{Diagnosis, DiagnosisStats, Label},
    image::{loader::DEFAULT_MAX_IMAGE_BYTES, FeatureVector, ImageLoader, ImagePreprocessor, ReportFormatter},
    models::Predictor,
    Result,
};
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 诊断流水线：图像 → 特征向量 → 分类器 → 标签
///
/// 分类器在构造时注入，流水线本身无状态。
#[derive(Clone)]
pub struct DiagnosisPipeline {
    predictor: Arc<dyn Predictor>,
    max_image_size: usize,
}

impl DiagnosisPipeline {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self {
            predictor,
            max_image_size: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_size(mut self, max_image_size: usize) -> Self {
        self.max_image_size = max_image_size;
        self
    }

    /// 对已解码的图像进行分类
    pub fn predict(&self, image: &DynamicImage) -> Result<Label> {
        let features = ImagePreprocessor::feature_vector(image)?;
        self.predict_features(&features)
    }

    pub fn predict_features(&self, features: &FeatureVector) -> Result<Label> {
        self.predictor.predict(features)
    }

    /// 处理上传的原始字节
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Label> {
        let image = ImageLoader::from_bytes(bytes, self.max_image_size)?;
        self.predict(&image)
    }

    /// 完整诊断：分类 + 报告 + 耗时统计
    pub fn diagnose_bytes(&self, bytes: &[u8]) -> Result<Diagnosis> {
        let start_time = Instant::now();
        let image = ImageLoader::from_bytes(bytes, self.max_image_size)?;
        self.diagnose_decoded(&image, start_time, start_time.elapsed())
    }

    pub fn diagnose_base64(&self, base64_data: &str) -> Result<Diagnosis> {
        let start_time = Instant::now();
        let image = ImageLoader::from_base64(base64_data, self.max_image_size)?;
        self.diagnose_decoded(&image, start_time, start_time.elapsed())
    }

    fn diagnose_decoded(
        &self,
        image: &DynamicImage,
        start_time: Instant,
        decode_time: Duration,
    ) -> Result<Diagnosis> {
        let (source_width, source_height) = image.dimensions();

        let preprocess_start = Instant::now();
        let features = ImagePreprocessor::feature_vector(image)?;
        let preprocess_time = preprocess_start.elapsed();

        let inference_start = Instant::now();
        let label = self.predict_features(&features)?;
        let inference_time = inference_start.elapsed();

        tracing::debug!(
            "Classified {}x{} image as {:?} (preprocess={:?}, inference={:?})",
            source_width,
            source_height,
            label,
            preprocess_time,
            inference_time
        );

        Ok(Diagnosis {
            label,
            class_index: label.class_index(),
            processing_time: start_time.elapsed().as_secs_f32(),
            report: ReportFormatter::render(label),
            stats: DiagnosisStats {
                decode_time_ms: decode_time.as_millis() as u64,
                preprocess_time_ms: preprocess_time.as_millis() as u64,
                inference_time_ms: inference_time.as_millis() as u64,
                source_width,
                source_height,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::FEATURE_VECTOR_LENGTH;
    use crate::models::LinearSvm;
    use crate::utils::error::ScanError;
    use image::{ImageFormat, Rgb, RgbImage};
    use parking_lot::Mutex;
    use std::io::Cursor;

    /// 记录收到的特征向量
    struct Recording {
        seen: Mutex<Vec<FeatureVector>>,
        label: Label,
    }

    impl Predictor for Recording {
        fn predict(&self, features: &FeatureVector) -> Result<Label> {
            self.seen.lock().push(features.clone());
            Ok(self.label)
        }

        fn kind(&self) -> &'static str {
            "recording"
        }
    }

    fn brightness_svm() -> Arc<dyn Predictor> {
        // 平均亮度超过 0.5 判为肿瘤
        let weights = vec![1.0 / FEATURE_VECTOR_LENGTH as f32; FEATURE_VECTOR_LENGTH];
        Arc::new(LinearSvm::new(weights, -0.5, [0, 1]).unwrap())
    }

    fn jpeg_bytes(image: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn black_jpeg_is_classified_deterministically() {
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            label: Label::NoTumor,
        });
        let pipeline = DiagnosisPipeline::new(recording.clone());
        let bytes = jpeg_bytes(&RgbImage::from_pixel(400, 600, Rgb([0, 0, 0])));

        let first = pipeline.predict_bytes(&bytes).unwrap();
        let second = pipeline.predict_bytes(&bytes).unwrap();
        assert_eq!(first, second);

        let seen = recording.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0].len(), FEATURE_VECTOR_LENGTH);
        assert!(seen[0].as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn linear_model_separates_dark_and_bright() {
        let pipeline = DiagnosisPipeline::new(brightness_svm());

        let dark = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([10, 10, 10])));
        let bright = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([240, 240, 240])));

        assert_eq!(pipeline.predict(&dark).unwrap(), Label::NoTumor);
        assert_eq!(pipeline.predict(&bright).unwrap(), Label::Tumor);
    }

    #[test]
    fn empty_upload_produces_no_label() {
        let pipeline = DiagnosisPipeline::new(brightness_svm());
        assert!(matches!(
            pipeline.predict_bytes(&[]),
            Err(ScanError::InvalidImage(_))
        ));
        assert!(matches!(
            pipeline.diagnose_bytes(b"%PDF-1.7 not an image"),
            Err(ScanError::InvalidImage(_))
        ));
    }

    #[test]
    fn diagnosis_carries_report_and_stats() {
        let pipeline = DiagnosisPipeline::new(brightness_svm());
        let bytes = jpeg_bytes(&RgbImage::from_pixel(300, 200, Rgb([250, 250, 250])));

        let diagnosis = pipeline.diagnose_bytes(&bytes).unwrap();
        assert_eq!(diagnosis.label, Label::Tumor);
        assert_eq!(diagnosis.class_index, 1);
        assert_eq!(diagnosis.report.recommendations.len(), 2);
        assert_eq!(
            (diagnosis.stats.source_width, diagnosis.stats.source_height),
            (300, 200)
        );
    }

    #[test]
    fn upload_limit_is_enforced() {
        let pipeline = DiagnosisPipeline::new(brightness_svm()).with_max_image_size(32);
        let bytes = jpeg_bytes(&RgbImage::from_pixel(32, 32, Rgb([1, 2, 3])));
        assert!(matches!(
            pipeline.predict_bytes(&bytes),
            Err(ScanError::FileTooLarge(_, 32))
        ));
    }
}
