pub mod handlers;
pub mod middleware;
pub mod extractors;
pub mod ui;

use crate::{models::ModelManager, utils::error::ScanError, Config, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub manager: Arc<ModelManager>,
}

pub async fn serve(config: Config) -> Result<()> {
    // 加载模型；失败即为致命错误，不启动服务
    let manager = Arc::new(ModelManager::new(&config));
    {
        let manager = Arc::clone(&manager);
        let config = config.clone();
        let loaded = tokio::task::spawn_blocking(move || manager.load(&config))
            .await
            .map_err(|e| ScanError::Internal(format!("Model loading task failed: {}", e)))?;
        if let Err(e) = loaded {
            if e.is_fatal() {
                tracing::error!("Cannot serve without a classifier: {}", e);
            }
            return Err(e);
        }
    }

    let state = AppState {
        config: config.clone(),
        manager,
    };
    let app = create_app(state);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        ScanError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /diagnose         - JSON base64 upload");
    tracing::info!("  POST /diagnose/upload  - Multipart file upload");
    tracing::info!("  GET  /                 - Web UI");
    tracing::info!("  GET  /health           - Health check");
    tracing::info!("  GET  /api/info         - Service information");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ScanError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ScanError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let server_config = state.config.server_config.clone();

    Router::new()
        // 诊断API路由
        .route("/diagnose", post(handlers::diagnose_json_handler))
        .route("/diagnose/upload", post(handlers::diagnose_upload_handler))
        // Web UI路由
        .route("/", get(ui::index_handler))
        // 系统路由
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server_config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(server_config.request_timeout)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Response {
    let (status, health) = match state.manager.health_check() {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => (e.status_code(), "unavailable"),
    };

    let body = json!({
        "status": health,
        "state": state.manager.state(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    });

    (status, Json(body)).into_response()
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.manager.get_stats();
    Json(json!({
        "service": "Brain Tumor Detection Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "model": stats,
        "labels": ["no_tumor", "tumor"],
        "accepted_formats": ["png", "jpeg", "bmp", "tiff", "webp"]
    }))
}
