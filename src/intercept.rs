//! Response transform (interceptor) pipeline: ordered, composable handlers
//! keyed by method + path pattern, applied before a forwarded response is
//! emitted to the client and before it is persisted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;

use crate::model::{Body, RequestRecord, ResponseRecord};
use crate::pattern::Pattern;

#[derive(Clone)]
pub struct Context {
    pub request: RequestRecord,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
}

pub type Handler = Arc<dyn Fn(ResponseRecord, Context) -> BoxFuture<'static, ResponseRecord> + Send + Sync>;

pub fn delay(ms: u64) -> Handler {
    Arc::new(move |resp, _ctx| {
        Box::pin(async move {
            if ms > 0 {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            resp
        })
    })
}

pub fn replace_body(value: serde_json::Value) -> Handler {
    Arc::new(move |mut resp, _ctx| {
        let value = value.clone();
        Box::pin(async move {
            resp.body = Body::Json(value);
            resp
        })
    })
}

pub fn modify_body<F>(f: F) -> Handler
where
    F: Fn(serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |mut resp, _ctx| {
        let f = f.clone();
        Box::pin(async move {
            if let Body::Json(v) = resp.body {
                resp.body = Body::Json(f(v));
            }
            resp
        })
    })
}

pub fn set_status(code: u16) -> Handler {
    Arc::new(move |mut resp, _ctx| {
        Box::pin(async move {
            resp.status = code;
            resp
        })
    })
}

pub fn merge_headers(headers: BTreeMap<String, String>) -> Handler {
    Arc::new(move |mut resp, _ctx| {
        let headers = headers.clone();
        Box::pin(async move {
            for (k, v) in headers {
                resp.headers.insert(k.to_ascii_lowercase(), v);
            }
            resp
        })
    })
}

pub fn synthetic_error(status: u16, message: String) -> Handler {
    Arc::new(move |mut resp, _ctx| {
        let message = message.clone();
        Box::pin(async move {
            resp.status = status;
            resp.body = Body::Json(serde_json::json!({
                "error": crate::chaos::status_text(status),
                "message": message,
            }));
            resp
        })
    })
}

/// Invokes handlers left-to-right, threading the response through each link.
pub fn chain(handlers: Vec<Handler>) -> Handler {
    Arc::new(move |resp, ctx| {
        let handlers = handlers.clone();
        Box::pin(async move {
            let mut current = resp;
            for handler in handlers {
                current = handler(current, ctx.clone()).await;
            }
            current
        })
    })
}

struct InterceptRule {
    id: u64,
    method: String,
    pattern: Pattern,
    enabled: bool,
    priority: i32,
    handler: Handler,
}

impl InterceptRule {
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
pub struct InterceptRegistry {
    rules: RwLock<Vec<InterceptRule>>,
    next_id: AtomicU64,
}

impl InterceptRegistry {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, method: impl Into<String>, pattern: Pattern, priority: i32, handler: Handler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.rules.write().push(InterceptRule {
            id,
            method: method.into(),
            pattern,
            enabled: true,
            priority,
            handler,
        });
        id
    }

    pub fn set_enabled(&self, id: u64, enabled: bool) -> bool {
        let mut rules = self.rules.write();
        if let Some(rule) = rules.iter_mut().find(|r| r.id == id) {
            rule.enabled = enabled;
            true
        } else {
            false
        }
    }

    /// Among every matching rule the strictly-highest-priority one wins;
    /// equal priority keeps whichever was inserted first, since only a
    /// strictly greater priority ever replaces the running best.
    fn find_best(&self, method: &str, path: &str) -> Option<(Handler, BTreeMap<String, String>)> {
        let rules = self.rules.read();
        let mut best: Option<(&InterceptRule, BTreeMap<String, String>)> = None;
        for rule in rules.iter() {
            if let Some(params) = rule.matches(method, path) {
                match &best {
                    Some((b, _)) if rule.priority <= b.priority => {}
                    _ => best = Some((rule, params)),
                }
            }
        }
        best.map(|(rule, params)| (rule.handler.clone(), params))
    }

    /// Applies the highest-priority matching rule, if any; returns the
    /// response untouched when nothing matches.
    pub async fn apply(
        &self,
        method: &str,
        path: &str,
        response: ResponseRecord,
        request: RequestRecord,
        query: BTreeMap<String, String>,
    ) -> ResponseRecord {
        let Some((handler, params)) = self.find_best(method, path) else {
            return response;
        };
        let ctx = Context {
            request,
            params,
            query,
        };
        handler(response, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::generate_id;

    fn empty_request() -> RequestRecord {
        RequestRecord {
            method: "GET".to_string(),
            url: "/x".to_string(),
            path: "/x".to_string(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: Body::Absent,
            id: generate_id(),
            captured_at: 0,
        }
    }

    fn base_response() -> ResponseRecord {
        ResponseRecord {
            status: 200,
            headers: [("content-type".to_string(), "application/json".to_string())].into(),
            body: Body::Json(serde_json::json!({"name": "Test"})),
            captured_at: 0,
        }
    }

    #[tokio::test]
    async fn chain_applies_handlers_in_order() {
        let registry = InterceptRegistry::new();
        let h = chain(vec![
            set_status(201),
            merge_headers([("X-Test".to_string(), "yes".to_string())].into()),
            modify_body(|v| {
                let mut obj = v.as_object().cloned().unwrap_or_default();
                obj.insert("chained".to_string(), serde_json::json!(true));
                serde_json::Value::Object(obj)
            }),
        ]);
        registry.register("GET", Pattern::compile("/x"), 0, h);

        let result = registry
            .apply("GET", "/x", base_response(), empty_request(), BTreeMap::new())
            .await;

        assert_eq!(result.status, 201);
        assert_eq!(result.headers.get("x-test"), Some(&"yes".to_string()));
        assert_eq!(result.headers.get("content-type"), Some(&"application/json".to_string()));
        assert_eq!(
            result.body,
            Body::Json(serde_json::json!({"name": "Test", "chained": true}))
        );
    }

    #[tokio::test]
    async fn higher_priority_wins_ties_keep_insertion_order() {
        let registry = InterceptRegistry::new();
        registry.register("GET", Pattern::compile("/x"), 0, set_status(1));
        registry.register("GET", Pattern::compile("/x"), 0, set_status(2));
        let result = registry
            .apply("GET", "/x", base_response(), empty_request(), BTreeMap::new())
            .await;
        assert_eq!(result.status, 1);

        let registry2 = InterceptRegistry::new();
        registry2.register("GET", Pattern::compile("/x"), 0, set_status(1));
        registry2.register("GET", Pattern::compile("/x"), 5, set_status(2));
        let result2 = registry2
            .apply("GET", "/x", base_response(), empty_request(), BTreeMap::new())
            .await;
        assert_eq!(result2.status, 2);
    }

    #[tokio::test]
    async fn no_match_returns_response_untouched() {
        let registry = InterceptRegistry::new();
        let result = registry
            .apply("GET", "/nope", base_response(), empty_request(), BTreeMap::new())
            .await;
        assert_eq!(result.status, 200);
    }
}
