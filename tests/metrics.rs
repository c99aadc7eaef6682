use hyper::{Request, StatusCode};
use sni_proxy::body;
use sni_proxy::metrics::{ProxyMetrics, Timer};
use sni_proxy::middleware::request;
use sni_proxy::middleware::{
    RequestMiddleware, RequestMiddlewareChain, ResponseWriter, request_metrics,
};
use sni_proxy::proxy::ConnectionInfo;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[test]
fn test_metrics_new() {
    let metrics = ProxyMetrics::new();
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_requests, 0);
    assert_eq!(snapshot.bytes_sent, 0);
    assert_eq!(snapshot.average_processing_time_ms, 0.0);
    assert_eq!(snapshot.success_rate, 0.0);
}

#[test]
fn test_record_request_classifies_status() {
    let metrics = ProxyMetrics::new();
    metrics.record_request(StatusCode::OK, 100, Duration::from_millis(2));
    metrics.record_request(StatusCode::NOT_FOUND, 10, Duration::from_millis(4));
    metrics.record_request(StatusCode::BAD_GATEWAY, 0, Duration::from_millis(6));
    metrics.record_request(StatusCode::MOVED_PERMANENTLY, 0, Duration::from_millis(4));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_requests, 4);
    assert_eq!(snapshot.successful_requests, 2);
    assert_eq!(snapshot.client_errors, 1);
    assert_eq!(snapshot.server_errors, 1);
    assert_eq!(snapshot.bytes_sent, 110);
    assert_eq!(snapshot.success_rate, 50.0);
    assert!((snapshot.average_processing_time_ms - 4.0).abs() < 0.001);
}

#[test]
fn test_metrics_shared_across_clones() {
    let metrics = ProxyMetrics::new();
    let clone = metrics.clone();
    clone.record_request(StatusCode::OK, 1, Duration::ZERO);
    assert_eq!(metrics.total_requests.load(Ordering::Relaxed), 1);
}

#[test]
fn test_timer() {
    let timer = Timer::start();
    std::thread::sleep(Duration::from_millis(5));
    assert!(timer.elapsed() >= Duration::from_millis(5));
}

#[tokio::test]
async fn test_request_metrics_middleware_records_outcome() {
    let metrics = Arc::new(ProxyMetrics::new());
    let chain = RequestMiddlewareChain::new([request_metrics(Arc::clone(&metrics))]);
    let handler = chain.wrap(request::handler_fn(|mut rw, _req| async move {
        rw.write_text(StatusCode::NOT_FOUND, "nothing here");
        rw
    }));

    let mut req = Request::builder()
        .uri("/missing?x=1")
        .body(body::empty())
        .unwrap();
    req.extensions_mut().insert(ConnectionInfo {
        server_name: "a.example.com".to_string(),
        peer_addr: "127.0.0.1:40000".parse().unwrap(),
    });

    let rw = handler.handle(ResponseWriter::new(), req).await;
    assert_eq!(rw.status(), Some(StatusCode::NOT_FOUND));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_requests, 1);
    assert_eq!(snapshot.client_errors, 1);
    assert_eq!(snapshot.bytes_sent, "nothing here".len() as u64);
}

#[tokio::test]
async fn test_request_metrics_counts_unwritten_response_as_success() {
    let metrics = Arc::new(ProxyMetrics::new());
    let chain = RequestMiddlewareChain::new([request_metrics(Arc::clone(&metrics))]);

    let req = Request::builder().uri("/").body(body::empty()).unwrap();
    let rw = chain.handle(ResponseWriter::new(), req).await;
    assert!(!rw.is_written());

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.successful_requests, 1);
    assert_eq!(snapshot.bytes_sent, 0);
}
