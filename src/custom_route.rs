//! Custom route registry: user-declared method+pattern handlers that take
//! priority over every mode-default behavior. A match serves its response
//! directly, without consulting replay storage or the upstream forwarder.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use parking_lot::RwLock;

use crate::model::Body;
use crate::pattern::Pattern;

pub struct RouteContext {
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Body,
    pub headers: BTreeMap<String, String>,
}

pub struct RouteResponse {
    pub status: Option<u16>,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
}

impl RouteResponse {
    pub fn status_or_default(&self) -> u16 {
        self.status.unwrap_or(200)
    }
}

pub type RouteHandler = Arc<dyn Fn(RouteContext) -> BoxFuture<'static, RouteResponse> + Send + Sync>;

struct CustomRoute {
    id: u64,
    method: String,
    pattern: Pattern,
    enabled: bool,
    priority: i32,
    handler: RouteHandler,
}

impl CustomRoute {
    fn matches(&self, method: &str, path: &str) -> Option<BTreeMap<String, String>> {
        if !self.enabled {
            return None;
        }
        if self.method != "*" && !self.method.eq_ignore_ascii_case(method) {
            return None;
        }
        self.pattern.matches(path)
    }
}

#[derive(Default)]
pub struct CustomRouteRegistry {
    routes: RwLock<Vec<CustomRoute>>,
    next_id: AtomicU64,
}

impl CustomRouteRegistry {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a route at default priority 0. Returns `&Self` so callers
    /// can chain registrations fluently: `registry.route(..).route(..)`.
    pub fn route(&self, method: impl Into<String>, path: &str, handler: RouteHandler) -> &Self {
        self.route_with_priority(method, path, 0, handler)
    }

    pub fn route_with_priority(
        &self,
        method: impl Into<String>,
        path: &str,
        priority: i32,
        handler: RouteHandler,
    ) -> &Self {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.routes.write().push(CustomRoute {
            id,
            method: method.into(),
            pattern: Pattern::compile(path),
            enabled: true,
            priority,
            handler,
        });
        self
    }

    pub fn set_enabled(&self, id: u64, enabled: bool) -> bool {
        let mut routes = self.routes.write();
        if let Some(route) = routes.iter_mut().find(|r| r.id == id) {
            route.enabled = enabled;
            true
        } else {
            false
        }
    }

    fn find_best(&self, method: &str, path: &str) -> Option<(RouteHandler, BTreeMap<String, String>)> {
        let routes = self.routes.read();
        let mut best: Option<(&CustomRoute, BTreeMap<String, String>)> = None;
        for route in routes.iter() {
            if let Some(params) = route.matches(method, path) {
                match &best {
                    Some((b, _)) if route.priority <= b.priority => {}
                    _ => best = Some((route, params)),
                }
            }
        }
        best.map(|(route, params)| (route.handler.clone(), params))
    }

    /// Invokes the highest-priority matching route, if any.
    pub async fn dispatch(
        &self,
        method: &str,
        path: &str,
        query: BTreeMap<String, String>,
        body: Body,
        headers: BTreeMap<String, String>,
    ) -> Option<RouteResponse> {
        let (handler, params) = self.find_best(method, path)?;
        Some(
            handler(RouteContext {
                params,
                query,
                body,
                headers,
            })
            .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_handler(value: serde_json::Value) -> RouteHandler {
        Arc::new(move |_ctx| {
            let value = value.clone();
            Box::pin(async move {
                RouteResponse {
                    status: None,
                    headers: BTreeMap::new(),
                    body: value,
                }
            })
        })
    }

    #[tokio::test]
    async fn missing_status_defaults_to_200() {
        let registry = CustomRouteRegistry::new();
        registry.route("GET", "/api/data", json_handler(serde_json::json!({"source": "custom"})));
        let resp = registry
            .dispatch("GET", "/api/data", BTreeMap::new(), Body::Absent, BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(resp.status_or_default(), 200);
        assert_eq!(resp.body, serde_json::json!({"source": "custom"}));
    }

    #[tokio::test]
    async fn non_matching_path_returns_none() {
        let registry = CustomRouteRegistry::new();
        registry.route("GET", "/api/data", json_handler(serde_json::json!({})));
        let resp = registry
            .dispatch("GET", "/other", BTreeMap::new(), Body::Absent, BTreeMap::new())
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn fluent_chaining_registers_both_routes() {
        let registry = CustomRouteRegistry::new();
        registry
            .route("GET", "/a", json_handler(serde_json::json!({"r": "a"})))
            .route("GET", "/b", json_handler(serde_json::json!({"r": "b"})));
        let a = registry
            .dispatch("GET", "/a", BTreeMap::new(), Body::Absent, BTreeMap::new())
            .await
            .unwrap();
        let b = registry
            .dispatch("GET", "/b", BTreeMap::new(), Body::Absent, BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(a.body, serde_json::json!({"r": "a"}));
        assert_eq!(b.body, serde_json::json!({"r": "b"}));
    }
}
