use axum::response::{Html, IntoResponse};

const INDEX_HTML: &str = include_str!("../../templates/index.html");

/// 首页处理器
pub async fn index_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}
