//! Conversion of handler return values into `Response<WireBody>`.
//!
//! Every admin endpoint and custom-route/interceptor handler in this crate answers
//! JSON, so the `serde_json::Value` impl below carries the content-type header
//! automatically; the teacher crate had no such impl since its handlers returned
//! arbitrary user types instead of a JSON-first admin plane.

use std::convert::Infallible;

use bytes::Bytes;
use http::{Response, StatusCode, header::CONTENT_TYPE};
use http_body_util::Full;

use crate::body::WireBody;

pub trait Responder {
    fn into_response(self) -> Response<WireBody>;
}

impl Responder for Response<WireBody> {
    fn into_response(self) -> Response<WireBody> {
        self
    }
}

impl Responder for &'static str {
    fn into_response(self) -> Response<WireBody> {
        Response::new(WireBody::new(Full::from(Bytes::from_static(
            self.as_bytes(),
        ))))
    }
}

impl Responder for String {
    fn into_response(self) -> Response<WireBody> {
        Response::new(WireBody::new(Full::from(Bytes::from(self))))
    }
}

impl Responder for () {
    fn into_response(self) -> Response<WireBody> {
        Response::new(WireBody::empty())
    }
}

impl Responder for Infallible {
    fn into_response(self) -> Response<WireBody> {
        match self {}
    }
}

impl Responder for (StatusCode, String) {
    fn into_response(self) -> Response<WireBody> {
        let (status, body) = self;
        let mut res = Response::new(WireBody::new(Full::from(Bytes::from(body))));
        *res.status_mut() = status;
        res
    }
}

impl Responder for WireBody {
    fn into_response(self) -> Response<WireBody> {
        Response::new(self)
    }
}

impl Responder for anyhow::Error {
    fn into_response(self) -> Response<WireBody> {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Serializes a JSON value as the whole response body with status 200.
impl Responder for serde_json::Value {
    fn into_response(self) -> Response<WireBody> {
        (StatusCode::OK, self).into_response()
    }
}

/// Serializes a JSON value with an explicit status code; every admin handler
/// and chaos/intercept synthetic error in the engine goes through this impl.
impl Responder for (StatusCode, serde_json::Value) {
    fn into_response(self) -> Response<WireBody> {
        let (status, value) = self;
        let bytes = serde_json::to_vec(&value).unwrap_or_else(|_| b"{}".to_vec());
        let mut res = Response::new(WireBody::new(Full::from(Bytes::from(bytes))));
        *res.status_mut() = status;
        res.headers_mut().insert(
            CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_value_sets_content_type() {
        let res = (StatusCode::CREATED, serde_json::json!({"ok": true})).into_response();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(
            res.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn str_responder_defaults_to_200() {
        let res = "hello".into_response();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
