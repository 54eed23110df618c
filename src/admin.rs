//! Handlers for every `/__*` control-plane endpoint. Reached directly from
//! `Engine::dispatch` before any mode branching — admin traffic never
//! touches chaos, custom routes, or replay/forward at all.

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::Deserialize;
use serde_json::json;

use crate::body::WireBody;
use crate::chaos::{ErrorInjectionConfig, LatencyConfig};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::responder::Responder;
use crate::types::{Request, Response};

pub async fn handle(engine: &Engine, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    let result = match (&method, segments.as_slice()) {
        (&Method::GET, ["__health"]) => Ok(health(engine)),
        (&Method::GET, ["__status"]) => status(engine).await,
        (&Method::GET, ["__mocks"]) => list_mocks(engine).await,
        (&Method::DELETE, ["__mocks"]) => clear_mocks(engine).await,
        (&Method::DELETE, ["__mocks", id]) => delete_mock(engine, id).await,
        (&Method::POST, ["__mode"]) => set_mode(engine, req).await,
        (&Method::GET, ["__chaos"]) => Ok(chaos_status(engine)),
        (&Method::POST, ["__chaos"]) => set_chaos(engine, req).await,
        (&Method::GET, ["__admin"]) => Ok(admin_page()),
        _ => Err(EngineError::NotFound(format!("no admin endpoint at {path}"))),
    };

    match result {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

fn health(engine: &Engine) -> Response {
    json!({
        "status": "ok",
        "mode": engine.mode_wire_name(),
        "uptime": engine.uptime_seconds(),
    })
    .into_response()
}

async fn status(engine: &Engine) -> Result<Response, EngineError> {
    let count = engine.storage().count().await?;
    Ok(json!({
        "mode": engine.mode_wire_name(),
        "target": engine.target(),
        "recordedEntries": count,
        "port": engine.port(),
    })
    .into_response())
}

async fn list_mocks(engine: &Engine) -> Result<Response, EngineError> {
    let entries = engine.storage().list().await?;
    let projected: Vec<_> = entries
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "method": e.request.method,
                "path": e.request.path,
                "status": e.response.status,
                "createdAt": e.created_at,
            })
        })
        .collect();
    Ok(json!({ "count": projected.len(), "entries": projected }).into_response())
}

async fn clear_mocks(engine: &Engine) -> Result<Response, EngineError> {
    engine.storage().clear().await?;
    Ok(json!({"success": true, "message": "all recorded mocks cleared"}).into_response())
}

async fn delete_mock(engine: &Engine, id: &str) -> Result<Response, EngineError> {
    let removed = engine.storage().delete(id).await?;
    if !removed {
        return Err(EngineError::NotFound(format!("no recorded entry with id {id}")));
    }
    Ok(json!({"success": true, "message": format!("deleted mock {id}")}).into_response())
}

#[derive(Deserialize)]
struct ModeRequest {
    mode: String,
    #[serde(default)]
    target: Option<String>,
}

async fn set_mode(engine: &Engine, req: Request) -> Result<Response, EngineError> {
    let body = read_json_body::<ModeRequest>(req).await?;
    engine.set_mode(&body.mode, body.target)?;
    Ok(json!({"mode": engine.mode_wire_name()}).into_response())
}

fn chaos_status(engine: &Engine) -> Response {
    let stats = engine.chaos.stats();
    json!({
        "enabled": engine.chaos.enabled(),
        "requestsProcessed": stats.requests_processed,
        "errorsInjected": stats.errors_injected,
        "averageLatency": stats.average_latency_ms,
    })
    .into_response()
}

#[derive(Deserialize, Default)]
struct ChaosRequest {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    latency: Option<LatencyConfig>,
    #[serde(default)]
    error: Option<ErrorInjectionConfig>,
}

async fn set_chaos(engine: &Engine, req: Request) -> Result<Response, EngineError> {
    let body = read_json_body::<ChaosRequest>(req).await?;
    if let Some(enabled) = body.enabled {
        engine.chaos.set_enabled(enabled);
    }
    if let Some(latency) = &body.latency {
        latency
            .validate()
            .map_err(EngineError::Validation)?;
        engine.chaos.set_default_latency(Some(*latency));
    }
    if let Some(error) = &body.error {
        error.validate().map_err(EngineError::Validation)?;
        engine.chaos.set_default_error(Some(error.clone()));
    }
    Ok(chaos_status(engine))
}

async fn read_json_body<T: serde::de::DeserializeOwned>(req: Request) -> Result<T, EngineError> {
    let body = req.into_body();
    let collected = body
        .collect()
        .await
        .map_err(|e| EngineError::Validation(format!("failed to read request body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&collected).map_err(|e| EngineError::Validation(format!("invalid request body: {e}")))
}

fn admin_page() -> Response {
    const PAGE: &str = "<!doctype html><html><head><title>mockwire</title></head>\
<body><h1>mockwire admin</h1><p>See /__status, /__mocks, /__mode, /__chaos.</p></body></html>";
    let mut resp = hyper::Response::new(WireBody::new(Full::from(Bytes::from_static(PAGE.as_bytes()))));
    *resp.status_mut() = StatusCode::OK;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::journal::JournalStorage;
    use crate::storage::Storage;
    use std::sync::Arc;

    async fn test_engine() -> Engine {
        let dir = std::env::temp_dir().join(format!("mockwire-admin-test-{}", crate::model::generate_id()));
        let storage = Arc::new(JournalStorage::new(dir));
        storage.init().await.unwrap();
        let mut config = Config::default();
        config.server.port = 4123;
        Engine::new(storage, &config).unwrap()
    }

    // `Engine::dispatch` takes a real `hyper::Request<Incoming>`, which only a live
    // connection can produce, so admin coverage runs end to end over a loopback
    // listener, the same way `forward.rs`'s tests exercise a real socket.
    async fn spawn_engine(engine: Arc<Engine>) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(v) => v,
                    Err(_) => return,
                };
                let io = hyper_util::rt::TokioIo::new(stream);
                let engine = engine.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req| {
                        let engine = engine.clone();
                        async move { Ok::<_, std::convert::Infallible>(engine.dispatch(req).await) }
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, svc)
                        .await;
                });
            }
        });
        addr
    }

    async fn send(
        addr: std::net::SocketAddr,
        method: Method,
        path: &str,
        body: &str,
    ) -> (StatusCode, serde_json::Value) {
        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await.unwrap();
        tokio::spawn(async move {
            let _ = conn.await;
        });
        let req = hyper::Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost")
            .body(Full::from(Bytes::from(body.to_string())))
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_mode_and_uptime() {
        let engine = Arc::new(test_engine().await);
        let addr = spawn_engine(engine).await;
        let (status, body) = send(addr, Method::GET, "/__health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mode"], "mock");
        assert!(body["uptime"].is_u64());
    }

    #[tokio::test]
    async fn status_reports_port_and_recorded_entries_key() {
        let engine = Arc::new(test_engine().await);
        let addr = spawn_engine(engine).await;
        let (_, body) = send(addr, Method::GET, "/__status", "").await;
        assert_eq!(body["port"], 4123);
        assert_eq!(body["recordedEntries"], 0);
        assert!(body.get("recordedCount").is_none());
    }

    #[tokio::test]
    async fn mocks_list_is_projected_and_counted() {
        let engine = Arc::new(test_engine().await);
        let addr = spawn_engine(engine).await;
        let (_, body) = send(addr, Method::GET, "/__mocks", "").await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["entries"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn clear_and_delete_report_success_and_message() {
        let engine = Arc::new(test_engine().await);
        let addr = spawn_engine(engine).await;
        let (_, body) = send(addr, Method::DELETE, "/__mocks", "").await;
        assert_eq!(body["success"], true);
        assert!(body["message"].is_string());

        let (status, _) = send(addr, Method::DELETE, "/__mocks/missing-id", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mode_switch_accepts_an_inline_target() {
        let engine = Arc::new(test_engine().await);
        let addr = spawn_engine(engine.clone()).await;
        let (status, _) = send(
            addr,
            Method::POST,
            "/__mode",
            r#"{"mode":"proxy","target":"http://127.0.0.1:9"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(engine.mode_wire_name(), "proxy");
        assert_eq!(engine.target().as_deref(), Some("http://127.0.0.1:9"));
    }

    #[tokio::test]
    async fn mode_switch_to_forward_mode_without_any_target_400s() {
        let engine = Arc::new(test_engine().await);
        let addr = spawn_engine(engine).await;
        let (status, _) = send(addr, Method::POST, "/__mode", r#"{"mode":"proxy"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chaos_status_is_flat_and_camel_case() {
        let engine = Arc::new(test_engine().await);
        let addr = spawn_engine(engine).await;
        let (_, body) = send(addr, Method::GET, "/__chaos", "").await;
        assert!(body.get("stats").is_none());
        assert_eq!(body["requestsProcessed"], 0);
        assert_eq!(body["errorsInjected"], 0);
        assert!(body["averageLatency"].is_number());
    }
}
