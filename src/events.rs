//! In-process lifecycle event bus.
//!
//! A small named-signal dispatcher for cross-cutting observers (request
//! logging hooks, metrics, test assertions). Unlike the framework this grew
//! out of, there is no process-global singleton: the engine owns one
//! `EventBus` instance directly, so tests can build an isolated bus per case
//! instead of sharing hidden global state.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture};

/// Well-known event identifiers emitted by the engine and its collaborators.
pub mod ids {
    pub const ON_REQUEST: &str = "onRequest";
    pub const ON_RESPONSE: &str = "onResponse";
    pub const CHAOS_ERROR_INJECTED: &str = "chaos.error_injected";
    pub const FORWARD_FAILED: &str = "forward.failed";
    pub const STORAGE_WRITE_FAILED: &str = "storage.write_failed";
}

#[derive(Clone, Debug, Default)]
pub struct Event {
    pub id: String,
    pub metadata: HashMap<String, String>,
}

impl Event {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(id: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            metadata,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct Inner {
    handlers: DashMap<String, Vec<EventHandler>>,
}

/// Owned, per-engine event bus. Handlers registered for an id run
/// concurrently whenever that id is emitted.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F, Fut>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = id.into();
        let handler: EventHandler = Arc::new(move |event: Event| {
            let fut = handler(event);
            Box::pin(async move { fut.await })
        });
        self.inner.handlers.entry(id).or_default().push(handler);
    }

    /// Emits an event and awaits every registered handler for its id.
    pub async fn emit(&self, event: Event) {
        if let Some(entry) = self.inner.handlers.get(&event.id) {
            let handlers = entry.clone();
            drop(entry);
            let futures = handlers.into_iter().map(|handler| handler(event.clone()));
            let _ = join_all(futures).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn handlers_run_for_matching_id_only() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        bus.on(ids::ON_REQUEST, move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        bus.emit(Event::new(ids::ON_RESPONSE)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        bus.emit(Event::new(ids::ON_REQUEST)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multiple_handlers_for_same_id_all_run() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = calls.clone();
            bus.on(ids::CHAOS_ERROR_INJECTED, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        bus.emit(Event::new(ids::CHAOS_ERROR_INJECTED)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
