use crate::{
    diagnosis::{Diagnosis, DiagnosisPipeline},
    utils::error::ScanError,
    web::{
        extractors::{RequestId, ValidatedJson},
        AppState,
    },
    Result,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// JSON请求体（base64模式）
#[derive(Debug, Deserialize)]
pub struct DiagnoseJsonRequest {
    /// Base64编码的图像数据（可带 data: 前缀）
    pub image: String,
}

/// JSON响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub timestamp: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, request_id: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

/// 诊断结果 + 可直接渲染的 HTML 片段
#[derive(Debug, Serialize)]
pub struct DiagnosisPayload {
    #[serde(flatten)]
    pub diagnosis: Diagnosis,
    pub report_html: String,
}

impl From<Diagnosis> for DiagnosisPayload {
    fn from(diagnosis: Diagnosis) -> Self {
        let report_html = diagnosis.report.to_html();
        Self {
            diagnosis,
            report_html,
        }
    }
}

/// JSON base64上传处理器
pub async fn diagnose_json_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<DiagnoseJsonRequest>,
) -> Result<Json<ApiResponse<DiagnosisPayload>>> {
    let start_time = Instant::now();
    tracing::info!(
        "Processing JSON diagnose request: request_id={}, payload={} chars",
        request_id,
        request.image.len()
    );

    let pipeline = state.manager.pipeline()?;
    let diagnosis = run_blocking(pipeline, move |p| p.diagnose_base64(&request.image)).await?;

    tracing::info!(
        "JSON diagnose completed: request_id={}, label={:?}, time={:.3}s",
        request_id,
        diagnosis.label,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(diagnosis.into(), request_id)))
}

/// Multipart文件上传处理器
pub async fn diagnose_upload_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<DiagnosisPayload>>> {
    let start_time = Instant::now();
    tracing::info!("Processing multipart diagnose request: request_id={}", request_id);

    let body_limit = state.config.server_config.max_request_size;
    let mut image_data: Option<axum::body::Bytes> = None;

    // 解析multipart数据
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, body_limit, "Failed to read multipart field"))?
    {
        let field_name = field.name().unwrap_or("unknown").to_string();

        match field_name.as_str() {
            "file" => {
                // 验证内容类型
                if let Some(content_type) = field.content_type() {
                    if !content_type.starts_with("image/")
                        && content_type != "application/octet-stream"
                    {
                        return Err(ScanError::UnsupportedFormat(content_type.to_string()));
                    }
                }

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, body_limit, "Failed to read file data"))?;

                tracing::debug!("Received file: {} bytes", data.len());
                image_data = Some(data);
            }
            _ => {
                tracing::debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let image_data = image_data
        .ok_or_else(|| ScanError::InvalidInput("No image file provided".to_string()))?;

    let pipeline = state.manager.pipeline()?;
    let diagnosis = run_blocking(pipeline, move |p| p.diagnose_bytes(&image_data)).await?;

    tracing::info!(
        "Upload diagnose completed: request_id={}, label={:?}, time={:.3}s",
        request_id,
        diagnosis.label,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(diagnosis.into(), request_id)))
}

/// 分块上传超过 `RequestBodyLimitLayer` 时，错误在读取字段时才出现
fn multipart_error(err: MultipartError, body_limit: usize, context: &str) -> ScanError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ScanError::BodyTooLarge(body_limit)
    } else {
        ScanError::InvalidInput(format!("{}: {}", context, err))
    }
}

/// 解码、缩放和推理都是CPU密集操作，放到阻塞线程池执行
async fn run_blocking<F>(pipeline: DiagnosisPipeline, job: F) -> Result<Diagnosis>
where
    F: FnOnce(&DiagnosisPipeline) -> Result<Diagnosis> + Send + 'static,
{
    tokio::task::spawn_blocking(move || job(&pipeline))
        .await
        .map_err(|e| ScanError::Internal(format!("Diagnosis task failed: {}", e)))?
}
