//! The server adapter: one wrapped handler behind the `Handle` method.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use httpgrpc_common::handler::{Handler, RequestContext};
use httpgrpc_common::transport::{HttpService, HttpTransport, RpcServer, ServerConfig};
use httpgrpc_common::{Code, HttpRequest, HttpResponse, Result, Status};

/// Server adapter.
///
/// Each inbound call rebuilds a native request, runs the wrapped handler
/// exactly once and ships its response back. Responses with a status of 400
/// or above leave as RPC failures that embed the full response.
pub struct Server<H> {
    handler: H,
}

impl<H: Handler> Server<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Binds `bind_addr` and serves this adapter until `shutdown` fires.
    pub async fn serve(
        self,
        bind_addr: &str,
        config: ServerConfig,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let rpc = RpcServer::bind(bind_addr, config).await?;
        rpc.serve_with_shutdown(Arc::new(self), shutdown).await
    }
}

#[async_trait]
impl<H: Handler> HttpService for Server<H> {
    async fn handle(
        &self,
        request: HttpRequest,
        deadline: Option<Instant>,
    ) -> std::result::Result<HttpResponse, Status> {
        let tenant = request.tenant();
        let method = request.method.clone();
        let url = request.url.clone();

        let native = HttpTransport::from_wire_request(request).map_err(|e| {
            warn!(%method, %url, error = %e, "Rejected malformed request");
            Status::new(Code::InvalidArgument, e.to_string())
        })?;

        let ctx = RequestContext {
            tenant,
            deadline,
            cancel: CancellationToken::new(),
        };
        // Fires if this future is dropped, i.e. the call was aborted.
        let _abort_guard = ctx.cancel.clone().drop_guard();

        let response = self.handler.handle(ctx, native).await.map_err(|e| {
            warn!(%method, %url, error = %e, "Handler failed");
            Status::internal(e.to_string())
        })?;

        let response = HttpTransport::to_wire_response(response).map_err(|e| {
            warn!(%method, %url, error = %e, "Handler produced an unencodable response");
            Status::internal(e.to_string())
        })?;

        debug!(%method, %url, code = response.code, "Handled request");

        if response.is_error() {
            Err(Status::from_http_response(&response))
        } else {
            Ok(response)
        }
    }
}
