//! Response-processing middleware.
//!
//! Runs once per forwarded response, after the backend replied and before
//! anything is written to the client. Each node may inspect or replace the
//! response before or after calling its continuation; returning an error
//! without calling it stops the chain and fails the forward.

use crate::body::ProxyResponse;
use crate::error::ResponseMiddlewareError;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use std::future::Future;
use std::sync::Arc;

pub type ResponseResult = Result<ProxyResponse, ResponseMiddlewareError>;

/// A single node of a response middleware chain
pub type ResponseMiddlewareFn =
    Arc<dyn Fn(ProxyResponse, ResponseNext) -> BoxFuture<'static, ResponseResult> + Send + Sync>;

/// Build a chain node from an async closure
pub fn from_fn<F, Fut>(f: F) -> ResponseMiddlewareFn
where
    F: Fn(ProxyResponse, ResponseNext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResponseResult> + Send + 'static,
{
    Arc::new(
        move |resp: ProxyResponse, next: ResponseNext| -> BoxFuture<'static, ResponseResult> {
            Box::pin(f(resp, next))
        },
    )
}

/// Continuation over the remaining response nodes
#[derive(Clone)]
pub struct ResponseNext {
    nodes: Arc<Vec<ResponseMiddlewareFn>>,
    index: usize,
}

impl ResponseNext {
    pub fn run(self, resp: ProxyResponse) -> BoxFuture<'static, ResponseResult> {
        let Some(node) = self.nodes.get(self.index).cloned() else {
            return future::ready(Ok(resp)).boxed();
        };

        let next = ResponseNext {
            nodes: self.nodes,
            index: self.index + 1,
        };
        node(resp, next)
    }
}

/// Response-processing middleware of a multiple-host proxy
pub trait ResponseMiddleware: Send + Sync {
    fn handle(&self, resp: ProxyResponse) -> BoxFuture<'static, ResponseResult>;
}

/// Ordered chain of response nodes, traversed by index
#[derive(Clone, Default)]
pub struct ResponseMiddlewareChain {
    nodes: Arc<Vec<ResponseMiddlewareFn>>,
}

impl ResponseMiddlewareChain {
    pub fn new(nodes: impl IntoIterator<Item = ResponseMiddlewareFn>) -> Self {
        Self {
            nodes: Arc::new(nodes.into_iter().collect()),
        }
    }

    pub fn with(mut self, node: ResponseMiddlewareFn) -> Self {
        Arc::make_mut(&mut self.nodes).push(node);
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl ResponseMiddleware for ResponseMiddlewareChain {
    fn handle(&self, resp: ProxyResponse) -> BoxFuture<'static, ResponseResult> {
        let next = ResponseNext {
            nodes: Arc::clone(&self.nodes),
            index: 0,
        };
        next.run(resp)
    }
}

/// Response middleware that passes every response through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResponseMiddleware;

impl NoopResponseMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl ResponseMiddleware for NoopResponseMiddleware {
    fn handle(&self, resp: ProxyResponse) -> BoxFuture<'static, ResponseResult> {
        future::ready(Ok(resp)).boxed()
    }
}
