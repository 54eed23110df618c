//! HTTP server loop and graceful shutdown.
//!
//! Connections are accepted in a loop and each handed to its own task, same
//! as the framework this grew out of. What's new here is the shutdown path:
//! a Ctrl-C or SIGTERM stops the accept loop, and `serve` waits for every
//! in-flight connection to finish before closing storage.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hyper::{Request, server::conn::http1, service::service_fn};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::engine::Engine;

/// Runs the server until a shutdown signal arrives, then drains in-flight
/// connections and closes storage before returning.
pub async fn serve(listener: TcpListener, engine: Arc<Engine>) {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let drained = Arc::new(Notify::new());
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!(addr = %listener.local_addr().unwrap(), "mockwire listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to accept connection");
                        continue;
                    }
                };
                let io = hyper_util::rt::TokioIo::new(stream);
                let engine = engine.clone();
                let in_flight = in_flight.clone();
                let drained = drained.clone();

                in_flight.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let svc = service_fn(move |mut req: Request<_>| {
                        let engine = engine.clone();
                        async move {
                            req.extensions_mut().insert(addr);
                            Ok::<_, Infallible>(engine.dispatch(req).await)
                        }
                    });

                    let mut http = http1::Builder::new();
                    http.keep_alive(true);
                    if let Err(err) = http.serve_connection(io, svc).await {
                        tracing::debug!(error = %err, "connection ended with an error");
                    }

                    if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                        drained.notify_waiters();
                    }
                });
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, draining in-flight connections");
                break;
            }
        }
    }

    while in_flight.load(Ordering::SeqCst) > 0 {
        drained.notified().await;
    }

    if let Err(err) = engine.storage().close().await {
        tracing::warn!(error = %err, "error while closing storage during shutdown");
    }
    tracing::info!("shutdown complete");
}

#[cfg(unix)]
async fn shutdown_signal() {
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
