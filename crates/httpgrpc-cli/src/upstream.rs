//! A [`Handler`] that forwards to a plain HTTP service.

use async_trait::async_trait;
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, Request, Response};
use hyper::body::Bytes;
use tracing::debug;

use httpgrpc_common::handler::{BoxError, Handler, RequestContext};

/// Forwards every request to `base` with reqwest.
///
/// The request path and query are appended to the base URL. The caller's
/// deadline becomes the reqwest timeout and cancelling the context abandons
/// the upstream request.
#[derive(Debug, Clone)]
pub struct UpstreamHandler {
    client: reqwest::Client,
    base: String,
}

impl UpstreamHandler {
    /// # Errors
    ///
    /// Returns an error if `base` is not an `http://` or `https://` URL.
    pub fn new(base: &str) -> anyhow::Result<Self> {
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            anyhow::bail!("Invalid upstream: '{}' must start with http:// or https://", base);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url_for(&self, request: &Request<Bytes>) -> String {
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.base, path)
    }
}

#[async_trait]
impl Handler for UpstreamHandler {
    async fn handle(
        &self,
        ctx: RequestContext,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, BoxError> {
        let url = self.url_for(&request);
        let (parts, body) = request.into_parts();
        debug!(method = %parts.method, %url, "Forwarding upstream");

        let mut outbound = self
            .client
            .request(parts.method, url)
            .headers(strip_hop_headers(parts.headers))
            .body(body);
        if let Some(remaining) = ctx.remaining() {
            outbound = outbound.timeout(remaining);
        }

        let upstream = tokio::select! {
            sent = outbound.send() => sent?,
            _ = ctx.cancel.cancelled() => return Err("request cancelled".into()),
        };

        let status = upstream.status();
        let headers = strip_hop_headers(upstream.headers().clone());
        let body = tokio::select! {
            body = upstream.bytes() => body?,
            _ = ctx.cancel.cancelled() => return Err("request cancelled".into()),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_headers(mut headers: HeaderMap) -> HeaderMap {
    for name in [HOST, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING] {
        headers.remove(name);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use http::StatusCode;
    use httpgrpc_common::handler::handler_fn;
    use httpgrpc_server::HttpServer;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    /// Plain HTTP service that echoes what it received.
    async fn start_upstream() -> (String, CancellationToken) {
        let echo = handler_fn(|_ctx: RequestContext, req: Request<Bytes>| async move {
            if req.uri().path() == "/slow" {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            let summary = format!(
                "{} {} {}",
                req.method(),
                req.uri(),
                String::from_utf8_lossy(req.body())
            );
            let mut response = Response::new(Bytes::from(summary));
            if req.uri().path() == "/missing" {
                *response.status_mut() = StatusCode::NOT_FOUND;
            }
            response
                .headers_mut()
                .insert("x-upstream", http::HeaderValue::from_static("yes"));
            Ok::<_, BoxError>(response)
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move { HttpServer::new(echo).serve(listener, token).await });
        (format!("http://{}", addr), shutdown)
    }

    fn request(method: &str, uri: &str, body: &'static [u8]) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(HOST, "frontend.example")
            .body(Bytes::from_static(body))
            .unwrap()
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(UpstreamHandler::new("127.0.0.1:8080").is_err());
        let handler = UpstreamHandler::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(handler.base(), "http://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_forwards_method_path_and_body() {
        let (base, _shutdown) = start_upstream().await;
        let handler = UpstreamHandler::new(&base).unwrap();

        let response = handler
            .handle(RequestContext::new(), request("POST", "/push?x=1", b"payload"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"POST /push?x=1 payload");
        assert_eq!(response.headers().get("x-upstream").unwrap(), "yes");
    }

    #[tokio::test]
    async fn test_error_status_passes_through() {
        let (base, _shutdown) = start_upstream().await;
        let handler = UpstreamHandler::new(&base).unwrap();

        let response = handler
            .handle(RequestContext::new(), request("GET", "/missing", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deadline_bounds_upstream_call() {
        let (base, _shutdown) = start_upstream().await;
        let handler = UpstreamHandler::new(&base).unwrap();

        let ctx = RequestContext::new().with_timeout(Duration::from_millis(100));
        let start = std::time::Instant::now();
        let result = handler.handle(ctx, request("GET", "/slow", b"")).await;
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_abandons_upstream_call() {
        let (base, _shutdown) = start_upstream().await;
        let handler = UpstreamHandler::new(&base).unwrap();

        let ctx = RequestContext::new();
        let trigger = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = handler
            .handle(ctx, request("GET", "/slow", b""))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "request cancelled");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let handler = UpstreamHandler::new(&format!("http://{}", addr)).unwrap();
        let result = handler
            .handle(RequestContext::new(), request("GET", "/", b""))
            .await;
        assert!(result.is_err());
    }
}
