//! Request correlation middleware
//!
//! Assigns every request a UUID, logs start/completion, and stamps the
//! response with `X-Request-ID` and `X-Processing-Time-Ms` headers.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Per-request correlation id, available to handlers via extensions
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    request.extensions_mut().insert(request_id);

    info!(request_id = %request_id.0, %method, path, "Request started");
    let start = Instant::now();

    let mut response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    info!(
        request_id = %request_id.0,
        %method,
        path,
        status = response.status().as_u16(),
        duration_ms,
        "Request completed"
    );

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id.0.to_string()) {
        headers.insert("x-request-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&duration_ms.to_string()) {
        headers.insert("x-processing-time-ms", value);
    }

    response
}
