//! Request-processing middleware.
//!
//! A chain is an ordered list of nodes. Each node receives the response
//! writer, the request and a [`Next`] continuation, and decides whether (and
//! when) the rest of the chain runs:
//!
//! ```text
//! node[0] --next--> node[1] --next--> ... --next--> no-op
//! ```
//!
//! A node that returns without calling `next.run(..)` short-circuits every
//! node after it. Running past the last node is a no-op that hands the
//! writer back unchanged, so an empty chain never touches the response.

use crate::body::{self, ProxyRequest, ProxyResponse};
use crate::proxy::ConnectionInfo;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::sync::Arc;

/// A single node of a request middleware chain
pub type RequestMiddlewareFn = Arc<
    dyn Fn(ResponseWriter, ProxyRequest, Next) -> BoxFuture<'static, ResponseWriter>
        + Send
        + Sync,
>;

/// A request handler without a continuation, used to terminate a chain
pub type RequestHandlerFn =
    Arc<dyn Fn(ResponseWriter, ProxyRequest) -> BoxFuture<'static, ResponseWriter> + Send + Sync>;

/// Build a chain node from an async closure.
///
/// ```ignore
/// let node = request::from_fn(|rw, req, next| async move {
///     tracing::debug!("{} {}", req.method(), req.uri());
///     next.run(rw, req).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> RequestMiddlewareFn
where
    F: Fn(ResponseWriter, ProxyRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResponseWriter> + Send + 'static,
{
    Arc::new(
        move |rw: ResponseWriter, req: ProxyRequest, next: Next| -> BoxFuture<'static, ResponseWriter> {
            Box::pin(f(rw, req, next))
        },
    )
}

/// Build a terminal handler from an async closure
pub fn handler_fn<F, Fut>(f: F) -> RequestHandlerFn
where
    F: Fn(ResponseWriter, ProxyRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResponseWriter> + Send + 'static,
{
    Arc::new(
        move |rw: ResponseWriter, req: ProxyRequest| -> BoxFuture<'static, ResponseWriter> {
            Box::pin(f(rw, req))
        },
    )
}

/// Response sink handed down the request chain.
///
/// Nodes write a complete response into it; a writer nobody wrote to is
/// sent to the client as an empty `200 OK`.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    response: Option<ProxyResponse>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `response`, replacing anything written before
    pub fn write(&mut self, response: ProxyResponse) {
        self.response = Some(response);
    }

    /// Write a plain-text response with the given status
    pub fn write_text(&mut self, status: StatusCode, message: impl Into<Bytes>) {
        let mut response = Response::new(body::full(message));
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.write(response);
    }

    pub fn is_written(&self) -> bool {
        self.response.is_some()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|r| r.status())
    }

    pub fn response(&self) -> Option<&ProxyResponse> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut ProxyResponse> {
        self.response.as_mut()
    }

    pub fn into_response(self) -> ProxyResponse {
        self.response
            .unwrap_or_else(|| Response::new(body::empty()))
    }
}

/// Continuation passed to every node: the remainder of the chain
#[derive(Clone)]
pub struct Next {
    nodes: Arc<Vec<RequestMiddlewareFn>>,
    index: usize,
}

impl Next {
    /// Run the remaining nodes, returning the writer they produced
    pub fn run(self, rw: ResponseWriter, req: ProxyRequest) -> BoxFuture<'static, ResponseWriter> {
        let Some(node) = self.nodes.get(self.index).cloned() else {
            return future::ready(rw).boxed();
        };

        let next = Next {
            nodes: self.nodes,
            index: self.index + 1,
        };
        node(rw, req, next)
    }

    /// True when no nodes remain after this point
    pub fn is_end(&self) -> bool {
        self.index >= self.nodes.len()
    }
}

/// Request-processing middleware of a multiple-host proxy
pub trait RequestMiddleware: Send + Sync {
    /// Run the request through the middleware
    fn handle(&self, rw: ResponseWriter, req: ProxyRequest) -> BoxFuture<'static, ResponseWriter>;

    /// Return a middleware that runs `handler` after everything already composed
    fn wrap(&self, handler: RequestHandlerFn) -> Arc<dyn RequestMiddleware>;
}

/// Ordered chain of request nodes, traversed by index
#[derive(Clone, Default)]
pub struct RequestMiddlewareChain {
    nodes: Arc<Vec<RequestMiddlewareFn>>,
}

impl RequestMiddlewareChain {
    /// Nodes run in the order given
    pub fn new(nodes: impl IntoIterator<Item = RequestMiddlewareFn>) -> Self {
        Self {
            nodes: Arc::new(nodes.into_iter().collect()),
        }
    }

    /// Append a node to the tail of the chain
    pub fn with(mut self, node: RequestMiddlewareFn) -> Self {
        Arc::make_mut(&mut self.nodes).push(node);
        self
    }

    /// Append `handler` as a node that runs it and then continues the chain
    pub fn wrap_handler(self, handler: RequestHandlerFn) -> Self {
        self.with(terminal_node(handler))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl RequestMiddleware for RequestMiddlewareChain {
    fn handle(&self, rw: ResponseWriter, req: ProxyRequest) -> BoxFuture<'static, ResponseWriter> {
        let next = Next {
            nodes: Arc::clone(&self.nodes),
            index: 0,
        };
        next.run(rw, req)
    }

    fn wrap(&self, handler: RequestHandlerFn) -> Arc<dyn RequestMiddleware> {
        Arc::new(self.clone().wrap_handler(handler))
    }
}

/// Request middleware that does nothing with requests
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRequestMiddleware;

impl NoopRequestMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl RequestMiddleware for NoopRequestMiddleware {
    fn handle(&self, rw: ResponseWriter, _req: ProxyRequest) -> BoxFuture<'static, ResponseWriter> {
        future::ready(rw).boxed()
    }

    fn wrap(&self, handler: RequestHandlerFn) -> Arc<dyn RequestMiddleware> {
        Arc::new(RequestMiddlewareChain::default().wrap_handler(handler))
    }
}

fn terminal_node(handler: RequestHandlerFn) -> RequestMiddlewareFn {
    Arc::new(
        move |rw: ResponseWriter, req: ProxyRequest, next: Next| -> BoxFuture<'static, ResponseWriter> {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                if next.is_end() {
                    return handler(rw, req).await;
                }
                // The handler owns the body; later nodes get the request head only
                let head = request_head(&req);
                let rw = handler(rw, req).await;
                next.run(rw, head).await
            })
        },
    )
}

fn request_head(req: &ProxyRequest) -> ProxyRequest {
    let mut head = Request::new(body::empty());
    *head.method_mut() = req.method().clone();
    *head.uri_mut() = req.uri().clone();
    *head.version_mut() = req.version();
    *head.headers_mut() = req.headers().clone();
    if let Some(info) = req.extensions().get::<ConnectionInfo>() {
        head.extensions_mut().insert(info.clone());
    }
    head
}
