pub mod request;
pub mod request_metrics;
pub mod response;

pub use request::{
    Next, NoopRequestMiddleware, RequestHandlerFn, RequestMiddleware, RequestMiddlewareChain,
    RequestMiddlewareFn, ResponseWriter,
};
pub use request_metrics::request_metrics;
pub use response::{
    NoopResponseMiddleware, ResponseMiddleware, ResponseMiddlewareChain, ResponseMiddlewareFn,
    ResponseNext, ResponseResult,
};
