use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Body type flowing through the middleware chains in both directions
pub type ProxyBody = UnsyncBoxBody<Bytes, hyper::Error>;

pub type ProxyRequest = hyper::Request<ProxyBody>;
pub type ProxyResponse = hyper::Response<ProxyBody>;

pub fn full(data: impl Into<Bytes>) -> ProxyBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}
