use hyper::{Response, StatusCode};
use sni_proxy::body::{self, ProxyResponse};
use sni_proxy::error::ResponseMiddlewareError;
use sni_proxy::middleware::response::{self, ResponseMiddlewareFn};
use sni_proxy::middleware::{NoopResponseMiddleware, ResponseMiddleware, ResponseMiddlewareChain};
use std::sync::{Arc, Mutex};

fn ok_response() -> ProxyResponse {
    Response::new(body::full("backend"))
}

fn recording(trace: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> ResponseMiddlewareFn {
    let trace = Arc::clone(trace);
    response::from_fn(move |resp, next| {
        let trace = Arc::clone(&trace);
        async move {
            trace.lock().unwrap().push(name);
            next.run(resp).await
        }
    })
}

#[tokio::test]
async fn test_empty_chain_returns_response() {
    let chain = ResponseMiddlewareChain::default();
    assert!(chain.is_empty());

    let resp = chain.handle(ok_response()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_nodes_run_in_order() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let chain = ResponseMiddlewareChain::new([recording(&trace, "r1"), recording(&trace, "r2")]);

    chain.handle(ok_response()).await.unwrap();

    assert_eq!(*trace.lock().unwrap(), vec!["r1", "r2"]);
}

#[tokio::test]
async fn test_error_short_circuits() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let reject = response::from_fn(|resp: ProxyResponse, next| async move {
        if resp.status().is_server_error() {
            return Err(ResponseMiddlewareError::new("backend failure hidden"));
        }
        next.run(resp).await
    });
    let chain = ResponseMiddlewareChain::new([reject, recording(&trace, "after")]);

    let mut failing = ok_response();
    *failing.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

    let err = chain.handle(failing).await.unwrap_err();
    assert_eq!(err.message(), "backend failure hidden");
    assert!(trace.lock().unwrap().is_empty());

    // Healthy responses still reach the rest of the chain
    chain.handle(ok_response()).await.unwrap();
    assert_eq!(*trace.lock().unwrap(), vec!["after"]);
}

#[tokio::test]
async fn test_nodes_can_modify_response() {
    let chain = ResponseMiddlewareChain::default()
        .with(response::from_fn(|mut resp: ProxyResponse, next| async move {
            resp.headers_mut()
                .insert("x-proxied-by", "sni-proxy".parse().unwrap());
            next.run(resp).await
        }))
        .with(response::from_fn(|resp, next| async move {
            next.run(resp).await.map(|mut resp| {
                *resp.status_mut() = StatusCode::ACCEPTED;
                resp
            })
        }));
    assert_eq!(chain.len(), 2);

    let resp = chain.handle(ok_response()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(resp.headers()["x-proxied-by"], "sni-proxy");
}

#[tokio::test]
async fn test_noop_passes_through() {
    let resp = NoopResponseMiddleware::new()
        .handle(ok_response())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
