// Verbose request logging

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

/// Log every request line, then its status and latency once the handler returns.
///
/// For streamed replies the latency covers the time to the first byte only.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    tracing::info!("[VERBOSE] Request: {} {}", method, path);
    let response = next.run(req).await;
    tracing::info!(
        "[VERBOSE] Response: {} {} - Status: {} - Latency: {:?}",
        method,
        path,
        response.status().as_u16(),
        started.elapsed()
    );

    response
}
