use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Model artifact not found: {} (archive {:?} also missing)", .artifact.display(), .archive)]
    ArtifactMissing {
        artifact: PathBuf,
        archive: Option<PathBuf>,
    },

    #[error("Corrupt model artifact: {0}")]
    CorruptArtifact(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// 启动顺序错误：模型尚未加载完成就收到了推理请求
    #[error("Predictor unavailable: model is {0}")]
    PredictorUnavailable(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    /// 请求体在读取过程中超过上限（没有 Content-Length，无法得知实际大小）
    #[error("Request body exceeds the {0} byte limit")]
    BodyTooLarge(usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ScanError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScanError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            ScanError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ScanError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            ScanError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ScanError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ScanError::PredictorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ScanError::ArtifactMissing { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ScanError::CorruptArtifact(_) => StatusCode::SERVICE_UNAVAILABLE,
            ScanError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ScanError::ArtifactMissing { .. } => "ARTIFACT_MISSING",
            ScanError::CorruptArtifact(_) => "CORRUPT_ARTIFACT",
            ScanError::InvalidImage(_) => "INVALID_IMAGE",
            ScanError::PredictorUnavailable(_) => "PREDICTOR_UNAVAILABLE",
            ScanError::InvalidInput(_) => "INVALID_INPUT",
            ScanError::FileTooLarge(_, _) | ScanError::BodyTooLarge(_) => "FILE_TOO_LARGE",
            ScanError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ScanError::Config(_) => "CONFIG_ERROR",
            ScanError::Io(_) => "IO_ERROR",
            ScanError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 启动期错误（进程无法提供服务）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::ArtifactMissing { .. } | ScanError::CorruptArtifact(_)
        )
    }
}

impl From<image::ImageError> for ScanError {
    fn from(err: image::ImageError) -> Self {
        ScanError::InvalidImage(err.to_string())
    }
}

impl From<base64::DecodeError> for ScanError {
    fn from(err: base64::DecodeError) -> Self {
        ScanError::InvalidImage(format!("base64 decode failed: {}", err))
    }
}

impl From<ort::Error> for ScanError {
    fn from(err: ort::Error) -> Self {
        ScanError::CorruptArtifact(format!("onnx runtime: {}", err))
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::CorruptArtifact(format!("json: {}", err))
    }
}

impl From<zip::result::ZipError> for ScanError {
    fn from(err: zip::result::ZipError) -> Self {
        ScanError::CorruptArtifact(format!("archive: {}", err))
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "success": false,
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        tracing::error!("Request failed: {} ({})", self, status);

        (status, axum::Json(error_response)).into_response()
    }
}
