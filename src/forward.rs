//! Upstream forwarder: dials the configured target once per request and
//! relays a `RequestRecord` to it, decoding the response back into a
//! `ResponseRecord`.
//!
//! No connection pooling: each call opens a fresh TCP (or TLS) connection,
//! sends exactly one request, and tears the connection down once the
//! response is read. The forwarder only ever serves one in-flight request
//! per call, so a pooled client would add a dependency this crate doesn't
//! otherwise need; should throughput ever demand it, `hyper-util`'s
//! `client::legacy` pool is the natural next step.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::SendRequest;
use hyper::client::{self};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::error::EngineError;
use crate::model::{headers_to_map, now_millis, Body, RequestRecord, ResponseRecord};

/// Headers that describe the hop between client and server, not the payload
/// itself, and must not be copied verbatim onto the relayed message.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "content-encoding",
    "content-length",
    "host",
];

fn strip_hop_by_hop(headers: &mut std::collections::BTreeMap<String, String>) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

async fn send_once(
    url: &Url,
    outbound: http::Request<Full<Bytes>>,
) -> Result<http::Response<Vec<u8>>, Box<dyn StdError + Send + Sync>> {
    let host = url.host_str().ok_or("target url has no host")?;
    let is_tls = url.scheme() == "https";
    let port = url.port().unwrap_or(if is_tls { 443 } else { 80 });
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(addr).await?;

    let response = if is_tls {
        let mut roots = RootCertStore::empty();
        roots.extend(TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(host.to_string())?;
        let tls_stream = connector.connect(server_name, tcp).await?;
        let io = TokioIo::new(tls_stream);
        send_over(io, outbound).await?
    } else {
        let io = TokioIo::new(tcp);
        send_over(io, outbound).await?
    };
    Ok(response)
}

async fn send_over<IO>(
    io: IO,
    outbound: http::Request<Full<Bytes>>,
) -> Result<http::Response<Vec<u8>>, Box<dyn StdError + Send + Sync>>
where
    IO: hyper::rt::Read + hyper::rt::Write + Send + Unpin + 'static,
{
    let (mut sender, conn): (SendRequest<Full<Bytes>>, _) =
        client::conn::http1::handshake(io).await?;
    let conn_task = tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "upstream connection ended");
        }
    });
    let mut response = sender.send_request(outbound).await?;
    let mut body = Vec::new();
    while let Some(frame) = response.frame().await {
        let frame = frame?;
        if let Some(chunk) = frame.data_ref() {
            body.extend_from_slice(chunk);
        }
    }
    conn_task.abort();
    let (parts, _) = response.into_parts();
    Ok(http::Response::from_parts(parts, body))
}

fn build_outbound(
    record: &RequestRecord,
    url: &Url,
) -> Result<http::Request<Full<Bytes>>, Box<dyn StdError + Send + Sync>> {
    let mut path = url.path().trim_end_matches('/').to_string();
    path.push_str(&record.path);
    let query = serde_urlencoded::to_string(&record.query).unwrap_or_default();
    let uri = if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    };

    let mut builder = http::Request::builder()
        .method(record.method.as_str())
        .uri(uri);
    for (name, value) in &record.headers {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }
    // changeOrigin: target authority replaces whatever Host the client sent.
    let host_header = match url.port() {
        Some(p) => format!("{}:{p}", url.host_str().unwrap_or_default()),
        None => url.host_str().unwrap_or_default().to_string(),
    };
    builder = builder.header("host", host_header);

    let body = Full::new(Bytes::from(record.body.to_bytes()));
    Ok(builder.body(body)?)
}

fn decode_response(status: u16, headers: std::collections::BTreeMap<String, String>, bytes: &[u8]) -> Body {
    let content_type = headers.get("content-type").map(|s| s.as_str());
    let _ = status;
    Body::decode(bytes, content_type)
}

/// Relays `record` to `target_url`, applying `timeout` as the total deadline
/// for connect + send + read. Connect failures map to `UpstreamUnreachable`
/// (502); a deadline overrun maps to `UpstreamTimeout` (504).
pub async fn forward(
    record: &RequestRecord,
    target_url: &str,
    timeout: Duration,
) -> Result<ResponseRecord, EngineError> {
    let url = Url::parse(target_url)
        .map_err(|e| EngineError::Validation(format!("invalid target url: {e}")))?;
    let outbound = build_outbound(record, &url)
        .map_err(|e| EngineError::Validation(format!("invalid outbound request: {e}")))?;

    let result = tokio::time::timeout(timeout, send_once(&url, outbound)).await;
    let response = match result {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => return Err(EngineError::UpstreamUnreachable(e.to_string())),
        Err(_) => return Err(EngineError::UpstreamTimeout(format!("{timeout:?} elapsed"))),
    };

    let status = response.status().as_u16();
    let mut headers = headers_to_map(response.headers());
    let body = decode_response(status, headers.clone(), response.body());
    strip_hop_by_hop(&mut headers);

    Ok(ResponseRecord {
        status,
        headers,
        body,
        captured_at: now_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::convert::Infallible;

    use http_body_util::Full as ResponseFull;
    use hyper::service::service_fn;

    fn sample_record(path: &str) -> RequestRecord {
        RequestRecord {
            method: "GET".to_string(),
            url: path.to_string(),
            path: path.to_string(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: Body::Absent,
            id: crate::model::generate_id(),
            captured_at: 0,
        }
    }

    async fn spawn_loopback() -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(v) => v,
                    Err(_) => return,
                };
                let io = TokioIo::new(stream);
                tokio::spawn(async move {
                    let service = service_fn(|_req: hyper::Request<hyper::body::Incoming>| async move {
                        Ok::<_, Infallible>(hyper::Response::new(ResponseFull::new(Bytes::from(
                            r#"{"ok":true}"#,
                        ))))
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn forwards_and_decodes_json_response() {
        let addr = spawn_loopback().await;
        let record = sample_record("/anything");
        let target = format!("http://{addr}");
        let resp = forward(&record, &target, Duration::from_secs(2)).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, Body::Json(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn connect_failure_maps_to_upstream_unreachable() {
        let record = sample_record("/x");
        let err = forward(&record, "http://127.0.0.1:1", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UpstreamUnreachable(_)));
    }

    #[tokio::test]
    async fn invalid_target_url_is_a_validation_error() {
        let record = sample_record("/x");
        let err = forward(&record, "not a url", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
