use crate::body::ProxyResponse;
use crate::metrics::{ProxyMetrics, Timer};
use crate::middleware::request::{self, RequestMiddlewareFn};
use crate::proxy::ConnectionInfo;
use hyper::StatusCode;
use hyper::body::Body;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::sync::Arc;
use tracing::info;

/// Request node that times the rest of the chain, records the outcome in
/// `metrics` and emits one JSON access-log line per request.
///
/// The log line is written from a spawned task so it never delays the
/// response already produced downstream.
pub fn request_metrics(metrics: Arc<ProxyMetrics>) -> RequestMiddlewareFn {
    request::from_fn(move |rw, req, next| {
        let metrics = Arc::clone(&metrics);
        async move {
            let method = req.method().to_string();
            let server_name = req
                .extensions()
                .get::<ConnectionInfo>()
                .map(|info| info.server_name.clone())
                .unwrap_or_default();
            let path = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());

            let timer = Timer::start();
            let rw = next.run(rw, req).await;
            let duration = timer.elapsed();

            // Unwritten writers go out as an empty 200
            let status = rw.status().unwrap_or(StatusCode::OK);
            let content_length = rw.response().and_then(content_length);
            let content_type = rw
                .response()
                .and_then(|r| r.headers().get(CONTENT_TYPE))
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            metrics.record_request(status, content_length.unwrap_or(0), duration);

            tokio::spawn(async move {
                let line = serde_json::json!({
                    "method": method,
                    "url": format!("https://{}{}", server_name, path),
                    "status": status.as_u16(),
                    "content_length": content_length,
                    "content_type": content_type,
                    "duration_us": duration.as_micros() as u64,
                });
                info!(target: "access_log", "{}", line);
            });

            rw
        }
    })
}

fn content_length(response: &ProxyResponse) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| response.body().size_hint().exact())
}
