//! Core type aliases shared across the engine, forwarder, and admin handlers.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Incoming;

use crate::body::WireBody;

/// Inbound request as handed to us by hyper, body not yet buffered.
pub type Request = hyper::Request<Incoming>;

/// Outbound response using our boxed body type.
pub type Response = hyper::Response<WireBody>;

pub(crate) type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;
