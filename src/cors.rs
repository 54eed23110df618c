//! Cross-origin support, applied as a direct call from the dispatcher rather
//! than through a middleware chain: the engine has one fixed pipeline, so
//! there is no `Next` to hand off to. `handle_preflight` short-circuits an
//! `OPTIONS` request before any mode branching; `apply_headers` decorates
//! every other response on its way out.

use http::{HeaderValue, Method};

use crate::body::WireBody;
use crate::config::CorsConfig;
use crate::types::Response;

const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "content-type, authorization";

/// Builds the `204 No Content` preflight reply, or `None` if the request
/// isn't a preflight (CORS disabled, or method isn't `OPTIONS`).
pub fn handle_preflight(cfg: &CorsConfig, method: &Method, origin: Option<&str>) -> Option<Response> {
    if !cfg.enabled || *method != Method::OPTIONS {
        return None;
    }
    let mut resp = hyper::Response::builder()
        .status(http::StatusCode::NO_CONTENT)
        .body(WireBody::empty())
        .expect("static preflight response is well-formed");
    apply_headers(cfg, origin, &mut resp);
    Some(resp)
}

/// Adds `Access-Control-*` headers to an outbound response in place. A no-op
/// if CORS is disabled or the origin isn't in the allow-list.
pub fn apply_headers(cfg: &CorsConfig, origin: Option<&str>, resp: &mut Response) {
    if !cfg.enabled {
        return;
    }
    let allow_origin = match resolve_origin(cfg, origin) {
        Some(v) => v,
        None => return,
    };
    let headers = resp.headers_mut();
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_str(&allow_origin).unwrap_or_else(|_| HeaderValue::from_static("*")),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert("access-control-max-age", HeaderValue::from_static("3600"));
}

fn resolve_origin(cfg: &CorsConfig, origin: Option<&str>) -> Option<String> {
    if cfg.origins.is_empty() || cfg.origins.iter().any(|o| o == "*") {
        return Some("*".to_string());
    }
    let origin = origin?;
    if cfg.origins.iter().any(|o| o == origin) {
        Some(origin.to_string())
    } else {
        None
    }
}
