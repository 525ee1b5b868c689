//! HTTP Server for any handler
//!
//! This module hosts a [`Handler`] on a plain HTTP/1.1 listener using hyper.
//! Put in front of the client adapter it turns an RPC backend back into an
//! ordinary HTTP service.
//!
//! # Architecture
//!
//! The HTTP server:
//! - Listens on a TCP socket for incoming HTTP connections
//! - Spawns a tokio task for each connection
//! - Reads each request body fully, then hands the request to the handler
//! - Takes the tenant from the `X-Scope-OrgID` header into the [`RequestContext`]
//! - Cancels the context when the peer goes away mid-request
//!
//! # Example
//!
//! ```no_run
//! use httpgrpc_server::{handler_fn, BoxError, HttpServer};
//! use http::Response;
//! use hyper::body::Bytes;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hello = handler_fn(|_ctx, _req| async {
//!         Ok::<_, BoxError>(Response::new(Bytes::from_static(b"world")))
//!     });
//!     HttpServer::new(hello).run("127.0.0.1:8080".parse().unwrap()).await.unwrap();
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use httpgrpc_common::handler::{Handler, RequestContext};
use httpgrpc_common::protocol::error::HttpgrpcError;
use httpgrpc_common::{TenantId, TENANT_HEADER};

/// Type alias for Hyper incoming requests
pub type HyperRequest = Request<Incoming>;

/// Type alias for Hyper responses with full body
pub type HyperResponse = Response<Full<Bytes>>;

/// HTTP/1.1 host for a [`Handler`].
pub struct HttpServer<H> {
    handler: Arc<H>,
}

impl<H: Handler> HttpServer<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Runs the HTTP server on the specified address until the process exits.
    pub async fn run(self, addr: SocketAddr) -> Result<(), HttpgrpcError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpgrpcError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener, CancellationToken::new()).await
    }

    /// Serves connections from `listener` until `shutdown` is cancelled, then
    /// waits for open connections to finish.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), HttpgrpcError> {
        tracing::info!(
            "HTTP server listening on {}",
            listener.local_addr().map_err(|e| {
                HttpgrpcError::Transport(format!("Failed to get local address: {}", e))
            })?
        );

        let tracker = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let handler = self.handler.clone();
            let shutdown = shutdown.clone();

            tracker.spawn(async move {
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(Self::handle_request(handler, req).await) }
                });

                let conn = http1::Builder::new().serve_connection(io, service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = shutdown.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };
                if let Err(err) = result {
                    tracing::debug!(%peer, "Error serving connection: {}", err);
                }
            });
        }

        tracker.close();
        tracker.wait().await;
        Ok(())
    }

    /// Handles an HTTP request.
    async fn handle_request(handler: Arc<H>, req: HyperRequest) -> HyperResponse {
        let (parts, body) = req.into_parts();

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                return text_response(StatusCode::BAD_REQUEST, "failed to read request body\n");
            }
        };

        let tenant = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| TenantId::new(v).ok());

        let ctx = RequestContext {
            tenant,
            ..RequestContext::new()
        };
        // hyper drops this future if the client disconnects
        let _disconnect_guard = ctx.cancel.clone().drop_guard();

        match handler.handle(ctx, Request::from_parts(parts, body)).await {
            Ok(response) => response.map(Full::new),
            Err(e) => {
                tracing::error!("Error handling request: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{}\n", e))
            }
        }
    }
}

fn text_response(status: StatusCode, body: &str) -> HyperResponse {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
