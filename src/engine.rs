//! Request engine: the one fixed dispatch pipeline every inbound request
//! passes through (admin short-circuit, CORS preflight, the `onRequest`
//! event, the chaos gate, custom routes, the active mode's branch, the
//! `onResponse` event), and the owner of every piece of engine-wide mutable
//! state. Nothing here is a process-global singleton — a binary or test
//! builds one `Engine` and holds it in an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use parking_lot::RwLock;

use crate::body::WireBody;
use crate::chaos::ChaosEngine;
use crate::config::{Config, CorsConfig};
use crate::cors;
use crate::custom_route::CustomRouteRegistry;
use crate::error::EngineError;
use crate::events::{self, Event, EventBus};
use crate::forward;
use crate::intercept::InterceptRegistry;
use crate::matcher::{self, MatcherConfig};
use crate::model::{generate_id, headers_to_map, now_millis, Body, RequestRecord, ResponseRecord};
use crate::responder::Responder;
use crate::storage::Storage;
use crate::types::{Request, Response};

/// Internal mode names. The wire names the admin API and config file use
/// (`mock`/`proxy`/`intercept`) are kept deliberately distinct from these —
/// they describe what the operator is asking for, these describe what the
/// engine actually does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Replay,
    RecordForward,
    TransformForward,
}

impl Mode {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "mock" => Some(Mode::Replay),
            "proxy" => Some(Mode::RecordForward),
            "intercept" => Some(Mode::TransformForward),
            _ => None,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Mode::Replay => "mock",
            Mode::RecordForward => "proxy",
            Mode::TransformForward => "intercept",
        }
    }

    fn needs_target(self) -> bool {
        matches!(self, Mode::RecordForward | Mode::TransformForward)
    }
}

pub struct Engine {
    mode: RwLock<Mode>,
    target_url: RwLock<Option<String>>,
    timeout: Duration,
    storage: Arc<dyn Storage>,
    pub chaos: ChaosEngine,
    pub intercepts: InterceptRegistry,
    pub custom_routes: CustomRouteRegistry,
    matcher_cfg: MatcherConfig,
    pub events: EventBus,
    cors_cfg: CorsConfig,
    port: u16,
    started_at: Instant,
}

impl Engine {
    pub fn new(storage: Arc<dyn Storage>, config: &Config) -> Result<Self, EngineError> {
        let mode = Mode::from_wire(&config.server.mode)
            .ok_or_else(|| EngineError::Fatal(format!("unknown mode in config: {}", config.server.mode)))?;
        if mode.needs_target() && config.target.url.is_none() {
            return Err(EngineError::Fatal(
                "server.mode requires forwarding but no target.url is configured".to_string(),
            ));
        }
        Ok(Self {
            mode: RwLock::new(mode),
            target_url: RwLock::new(config.target.url.clone()),
            timeout: Duration::from_millis(config.target.timeout.unwrap_or(10_000)),
            storage,
            chaos: ChaosEngine::new(),
            intercepts: InterceptRegistry::new(),
            custom_routes: CustomRouteRegistry::new(),
            matcher_cfg: config.matching.clone().into(),
            events: EventBus::new(),
            cors_cfg: config.cors.clone(),
            port: config.server.port,
            started_at: Instant::now(),
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn mode_wire_name(&self) -> &'static str {
        self.mode.read().wire_name()
    }

    pub fn target(&self) -> Option<String> {
        self.target_url.read().clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn set_mode(&self, wire: &str, target: Option<String>) -> Result<(), EngineError> {
        let mode = Mode::from_wire(wire)
            .ok_or_else(|| EngineError::Validation(format!("unknown mode: {wire}")))?;
        if let Some(target) = target {
            *self.target_url.write() = Some(target);
        }
        if mode.needs_target() && self.target_url.read().is_none() {
            return Err(EngineError::Validation(
                "cannot switch to a forwarding mode without a configured target".to_string(),
            ));
        }
        *self.mode.write() = mode;
        Ok(())
    }

    pub fn matcher_config(&self) -> &MatcherConfig {
        &self.matcher_cfg
    }

    async fn build_request_record(&self, req: Request) -> Result<RequestRecord, EngineError> {
        let (parts, body) = req.into_parts();
        let uri = parts.uri.clone();
        let path = uri.path().to_string();
        let query = uri
            .query()
            .and_then(|q| serde_urlencoded::from_str::<BTreeMap<String, String>>(q).ok())
            .unwrap_or_default();
        let headers = headers_to_map(&parts.headers);
        let content_type = headers.get("content-type").cloned();
        let collected = body
            .collect()
            .await
            .map_err(|e| EngineError::Validation(format!("failed to read request body: {e}")))?;
        let bytes = collected.to_bytes();
        let body = Body::decode(&bytes, content_type.as_deref());

        Ok(RequestRecord {
            method: parts.method.to_string(),
            url: uri.to_string(),
            path,
            query,
            headers,
            body,
            id: generate_id(),
            captured_at: now_millis(),
        })
    }

    async fn replay(&self, record: &RequestRecord) -> Result<ResponseRecord, EngineError> {
        let candidates = self.storage.list().await?;
        match matcher::find_best(record, &candidates, &self.matcher_cfg) {
            Some(entry) => Ok(entry.response.clone()),
            None => Err(EngineError::ReplayMiss {
                method: record.method.clone(),
                path: record.path.clone(),
            }),
        }
    }

    async fn record_forward(&self, record: &RequestRecord) -> Result<ResponseRecord, EngineError> {
        let target = self
            .target_url
            .read()
            .clone()
            .ok_or_else(|| EngineError::Validation("no target configured".to_string()))?;
        let response = forward::forward(record, &target, self.timeout).await?;
        self.persist(record, &response).await;
        Ok(response)
    }

    async fn transform_forward(&self, record: &RequestRecord) -> Result<ResponseRecord, EngineError> {
        let target = self
            .target_url
            .read()
            .clone()
            .ok_or_else(|| EngineError::Validation("no target configured".to_string()))?;
        let forwarded = forward::forward(record, &target, self.timeout).await?;
        let transformed = self
            .intercepts
            .apply(
                &record.method,
                &record.path,
                forwarded,
                record.clone(),
                record.query.clone(),
            )
            .await;
        self.persist(record, &transformed).await;
        Ok(transformed)
    }

    /// Persists a forwarded exchange; a write failure is logged and emitted
    /// as an event, never surfaced to the client whose response is already
    /// being written.
    async fn persist(&self, record: &RequestRecord, response: &ResponseRecord) {
        if let Err(e) = self.storage.save(record.clone(), response.clone()).await {
            tracing::warn!(error = %e, "failed to persist recorded exchange");
            let mut metadata = std::collections::HashMap::new();
            metadata.insert("error".to_string(), e.to_string());
            self.events
                .emit(Event::with_metadata(events::ids::STORAGE_WRITE_FAILED, metadata))
                .await;
        }
    }

    pub async fn dispatch(&self, req: Request) -> Response {
        let path = req.uri().path().to_string();
        let method = req.method().clone();
        let origin = req
            .headers()
            .get(http::header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if path.starts_with("/__") {
            return crate::admin::handle(self, req).await;
        }

        if let Some(resp) = cors::handle_preflight(&self.cors_cfg, &method, origin.as_deref()) {
            return resp;
        }

        let record = match self.build_request_record(req).await {
            Ok(r) => r,
            Err(e) => return e.into_response(),
        };

        self.events.emit(Event::new(events::ids::ON_REQUEST)).await;

        let outcome = self.chaos.apply(&record.method, &record.path).await;
        if let Some(err) = outcome.error {
            self.events
                .emit(Event::new(events::ids::CHAOS_ERROR_INJECTED))
                .await;
            let status = http::StatusCode::from_u16(err.status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
            let mut resp = (status, err.body).into_response();
            cors::apply_headers(&self.cors_cfg, origin.as_deref(), &mut resp);
            return resp;
        }

        if let Some(route_resp) = self
            .custom_routes
            .dispatch(
                &record.method,
                &record.path,
                record.query.clone(),
                record.body.clone(),
                record.headers.clone(),
            )
            .await
        {
            let status = http::StatusCode::from_u16(route_resp.status_or_default())
                .unwrap_or(http::StatusCode::OK);
            let mut resp = response_from_parts(status, route_resp.headers, route_resp.body);
            cors::apply_headers(&self.cors_cfg, origin.as_deref(), &mut resp);
            self.events.emit(Event::new(events::ids::ON_RESPONSE)).await;
            return resp;
        }

        let mode = *self.mode.read();
        let outcome = match mode {
            Mode::Replay => self.replay(&record).await,
            Mode::RecordForward => {
                let r = self.record_forward(&record).await;
                if matches!(&r, Err(EngineError::UpstreamUnreachable(_) | EngineError::UpstreamTimeout(_))) {
                    self.events.emit(Event::new(events::ids::FORWARD_FAILED)).await;
                }
                r
            }
            Mode::TransformForward => {
                let r = self.transform_forward(&record).await;
                if matches!(&r, Err(EngineError::UpstreamUnreachable(_) | EngineError::UpstreamTimeout(_))) {
                    self.events.emit(Event::new(events::ids::FORWARD_FAILED)).await;
                }
                r
            }
        };

        let mut resp = match outcome {
            Ok(record) => response_from_record(record),
            Err(e) => e.into_response(),
        };
        cors::apply_headers(&self.cors_cfg, origin.as_deref(), &mut resp);
        self.events.emit(Event::new(events::ids::ON_RESPONSE)).await;
        resp
    }
}

fn response_from_record(record: ResponseRecord) -> Response {
    let status = http::StatusCode::from_u16(record.status).unwrap_or(http::StatusCode::OK);
    let bytes = record.body.to_bytes();
    let mut builder = http::Response::builder().status(status);
    for (name, value) in &record.headers {
        builder = builder.header(name, value);
    }
    let mut resp = builder
        .body(WireBody::new(Full::from(Bytes::from(bytes))))
        .unwrap_or_else(|_| http::Response::new(WireBody::empty()));
    if matches!(record.body, Body::Json(_)) && !resp.headers().contains_key(http::header::CONTENT_TYPE) {
        resp.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
    }
    resp
}

fn response_from_parts(
    status: http::StatusCode,
    headers: BTreeMap<String, String>,
    body: serde_json::Value,
) -> Response {
    let bytes = serde_json::to_vec(&body).unwrap_or_else(|_| b"null".to_vec());
    let mut builder = http::Response::builder().status(status);
    for (name, value) in &headers {
        builder = builder.header(name, value);
    }
    let mut resp = builder
        .body(WireBody::new(Full::from(Bytes::from(bytes))))
        .unwrap_or_else(|_| http::Response::new(WireBody::empty()));
    if !resp.headers().contains_key(http::header::CONTENT_TYPE) {
        resp.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
    }
    resp
}
