use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::{Request, Response};
use hyper::body::Bytes;
use tracing::{debug, warn};

use httpgrpc_common::handler::{BoxError, Handler, RequestContext};
use httpgrpc_common::transport::{
    Codec, HttpTransport, TcpTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE,
};
use httpgrpc_common::{Code, HttpRequest, HttpResponse, HttpgrpcError, Result, RpcRequest};

use crate::channel::Channel;
use crate::discovery::{DnsConfig, DnsNamingService, NamingService};
use crate::resolver::{parse_address, Policy};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Frame codec; must match the server's
    pub codec: Codec,
    pub connect_timeout: Duration,
    pub max_message_size: usize,
    /// Deadline applied to calls whose context carries none
    pub default_timeout: Option<Duration>,
    /// How long construction waits for the first discovery result
    pub discovery_wait: Duration,
    /// Settings for the default DNS naming service
    pub dns: DnsConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            default_timeout: None,
            discovery_wait: Duration::from_secs(1),
            dns: DnsConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_discovery_wait(mut self, wait: Duration) -> Self {
        self.discovery_wait = wait;
        self
    }

    pub fn with_dns(mut self, dns: DnsConfig) -> Self {
        self.dns = dns;
        self
    }
}

/// How one call ended.
///
/// `Application` is a response the handler produced with a status of 400 or
/// above, recovered from the RPC failure it travelled in. `Transport` is
/// everything else that went wrong between caller and handler.
#[derive(Debug)]
pub enum CallOutcome {
    Ok(HttpResponse),
    Application(HttpResponse),
    Transport(HttpgrpcError),
}

impl CallOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CallOutcome::Ok(_))
    }

    /// Collapses the outcome into the response the caller sees.
    ///
    /// Transport failures become a plain-text response: 504 when a deadline
    /// ran out, 503 when no endpoint was available, 500 otherwise. The body
    /// names only the class of failure; endpoint addresses and other details
    /// stay in the client's logs.
    pub fn into_response(self) -> HttpResponse {
        match self {
            CallOutcome::Ok(response) | CallOutcome::Application(response) => response,
            CallOutcome::Transport(err) => {
                let (code, message) = synthesized(&err);
                HttpResponse::text(code, format!("{}\n", message))
            }
        }
    }
}

/// Status code and fixed message standing in for a transport failure.
fn synthesized(err: &HttpgrpcError) -> (u16, &'static str) {
    if let HttpgrpcError::Unavailable(_) = err {
        return (503, "no backend available");
    }
    match err.code() {
        Code::DeadlineExceeded => (504, "deadline exceeded"),
        Code::Cancelled => (500, "request cancelled"),
        Code::ResourceExhausted => (500, "message too large"),
        Code::InvalidArgument => (500, "invalid request"),
        Code::Unavailable => (500, "backend unreachable"),
        Code::DataLoss => (500, "invalid backend response"),
        _ => (500, "backend request failed"),
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    address: String,
    config: ClientConfig,
    naming: Option<Arc<dyn NamingService>>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Naming service for discovery targets; DNS is used when none is set.
    pub fn naming_service(mut self, naming: Arc<dyn NamingService>) -> Self {
        self.naming = Some(naming);
        self
    }

    /// Resolves the address and sets up the channel.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` or `UnsupportedScheme` when the address does not parse.
    pub async fn build(self) -> Result<Client> {
        let (target, policy) = parse_address(&self.address)?;
        let transport = TcpTransport::new()
            .with_connect_timeout(self.config.connect_timeout)
            .with_max_message_size(self.config.max_message_size);

        let channel = match policy {
            Policy::Direct => Channel::direct(target, transport, self.config.codec),
            Policy::Discovery(_) => {
                let naming: Arc<dyn NamingService> = match self.naming {
                    Some(naming) => naming,
                    None => Arc::new(DnsNamingService::new(self.config.dns.clone())),
                };
                Channel::discovery(
                    target,
                    policy,
                    naming.as_ref(),
                    transport,
                    self.config.codec,
                    self.config.discovery_wait,
                )
                .await?
            }
        };

        debug!(
            address = %self.address,
            target = %channel.target(),
            policy = %channel.policy(),
            "Client ready"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                channel,
                config: self.config,
            }),
        })
    }
}

/// The client adapter.
///
/// Looks like an ordinary [`Handler`] to its callers and forwards every
/// request to a remote server over the resolved channel. Cheap to clone;
/// clones share the channel and its connections.
///
/// # Example
///
/// ```no_run
/// use httpgrpc_client::Client;
/// use httpgrpc_common::{HttpRequest, RequestContext};
///
/// # async fn run() -> httpgrpc_common::Result<()> {
/// let client = Client::new("querier.cortex:9095").await?;
/// let response = client
///     .call(&RequestContext::new(), HttpRequest::new("GET", "/api/v1/labels"))
///     .await
///     .into_response();
/// println!("{}", response.code);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    channel: Channel,
    config: ClientConfig,
}

impl Client {
    /// Creates a client with the default configuration.
    pub async fn new(address: &str) -> Result<Self> {
        Self::builder(address).build().await
    }

    pub fn builder(address: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            address: address.into(),
            config: ClientConfig::default(),
            naming: None,
        }
    }

    /// The resolved transport target.
    pub fn target(&self) -> &str {
        self.inner.channel.target()
    }

    pub fn policy(&self) -> &Policy {
        self.inner.channel.policy()
    }

    /// Current endpoint set.
    pub fn endpoints(&self) -> Vec<String> {
        self.inner.channel.endpoints()
    }

    /// Sends one request and reports how it ended.
    ///
    /// The context's tenant replaces any tenant header on the request. The
    /// context's deadline, or the configured default timeout, bounds the whole
    /// call; cancelling the context abandons it.
    pub async fn call(&self, ctx: &RequestContext, mut request: HttpRequest) -> CallOutcome {
        if let Some(tenant) = &ctx.tenant {
            request.set_tenant(tenant);
        }

        let deadline = ctx.deadline.or_else(|| {
            self.inner
                .config
                .default_timeout
                .map(|timeout| Instant::now() + timeout)
        });

        let mut rpc = RpcRequest::new(request);
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return CallOutcome::Transport(HttpgrpcError::Timeout(0));
            }
            rpc = rpc.with_timeout((remaining.as_millis() as u64).max(1));
        }
        if ctx.is_cancelled() {
            return CallOutcome::Transport(HttpgrpcError::Cancelled);
        }

        let id = rpc.id;
        let budget_ms = rpc.timeout_ms;
        let method = rpc.payload.method.clone();
        let url = rpc.payload.url.clone();

        let connect = self.inner.channel.connection();
        let conn = tokio::select! {
            conn = connect => conn,
            _ = ctx.cancel.cancelled() => Err(HttpgrpcError::Cancelled),
            _ = sleep_until(deadline) => Err(HttpgrpcError::Timeout(budget_ms.unwrap_or(0))),
        };
        let conn = match conn {
            Ok(conn) => conn,
            Err(e) => {
                warn!(%method, %url, target = %self.target(), error = %e, "No connection");
                return CallOutcome::Transport(e);
            }
        };

        let outcome = match conn.call(rpc, &ctx.cancel, deadline).await {
            Ok(Ok(response)) => CallOutcome::Ok(response),
            Ok(Err(status)) => match status.http_response() {
                Some(response) => CallOutcome::Application(response),
                None => CallOutcome::Transport(HttpgrpcError::Rpc(status)),
            },
            Err(e) => CallOutcome::Transport(e),
        };

        match &outcome {
            CallOutcome::Ok(response) | CallOutcome::Application(response) => {
                debug!(id, %method, %url, endpoint = %conn.addr(), code = response.code, "Call completed")
            }
            CallOutcome::Transport(e) => {
                warn!(id, %method, %url, endpoint = %conn.addr(), error = %e, "Call failed")
            }
        }

        outcome
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl Handler for Client {
    async fn handle(
        &self,
        ctx: RequestContext,
        request: Request<Bytes>,
    ) -> std::result::Result<Response<Bytes>, BoxError> {
        let outcome = match HttpTransport::to_wire_request(request) {
            Ok(wire) => self.call(&ctx, wire).await,
            Err(e) => {
                warn!(error = %e, "Request cannot be sent");
                CallOutcome::Transport(e)
            }
        };

        let response = outcome.into_response();
        match HttpTransport::from_wire_response(response) {
            Ok(native) => Ok(native),
            Err(e) => {
                warn!(error = %e, "Server sent a response that cannot be rebuilt");
                let (code, message) = synthesized(&e);
                let fallback = HttpResponse::text(code, format!("{}\n", message));
                Ok(HttpTransport::from_wire_response(fallback)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpgrpc_common::Status;

    #[test]
    fn test_outcome_passthrough() {
        let ok = HttpResponse::new(200).with_body("world");
        assert_eq!(CallOutcome::Ok(ok.clone()).into_response(), ok);

        let app = HttpResponse::text(500, "foo\n");
        assert_eq!(CallOutcome::Application(app.clone()).into_response(), app);
    }

    #[test]
    fn test_transport_failures_are_synthesized() {
        let cases = [
            (HttpgrpcError::Timeout(100), 504, "deadline exceeded\n"),
            (HttpgrpcError::Rpc(Status::deadline_exceeded(100)), 504, "deadline exceeded\n"),
            (HttpgrpcError::Unavailable("no endpoints for querier".into()), 503, "no backend available\n"),
            (
                HttpgrpcError::Connection("connection to 10.0.0.7:9095 closed".into()),
                500,
                "backend unreachable\n",
            ),
            (HttpgrpcError::Cancelled, 500, "request cancelled\n"),
            (HttpgrpcError::MessageTooLarge { size: 10, max: 4 }, 500, "message too large\n"),
            (
                HttpgrpcError::Rpc(Status::internal("handler panicked")),
                500,
                "backend request failed\n",
            ),
        ];

        for (err, code, body) in cases {
            let detail = err.to_string();
            let response = CallOutcome::Transport(err).into_response();
            assert_eq!(response.code, code, "{}", detail);
            assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
            assert_eq!(String::from_utf8(response.body).unwrap(), body);
        }
    }

    #[test]
    fn test_synthesized_body_hides_endpoint() {
        let err = HttpgrpcError::Connection(
            "Failed to connect to 10.0.0.7:9095: connection refused".into(),
        );
        let body = CallOutcome::Transport(err).into_response().body;
        let body = String::from_utf8(body).unwrap();
        assert!(!body.contains("10.0.0.7"), "{}", body);
        assert!(!body.contains("9095"), "{}", body);
    }

    #[test]
    fn test_config_builders() {
        let config = ClientConfig::default()
            .with_codec(Codec::Json)
            .with_default_timeout(Duration::from_secs(3))
            .with_discovery_wait(Duration::ZERO);
        assert_eq!(config.codec, Codec::Json);
        assert_eq!(config.default_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.discovery_wait, Duration::ZERO);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[tokio::test]
    async fn test_construction_rejects_bad_addresses() {
        assert!(matches!(
            Client::new("ftp://x").await.err().unwrap(),
            HttpgrpcError::UnsupportedScheme { .. }
        ));
        assert!(matches!(
            Client::new("querier").await.err().unwrap(),
            HttpgrpcError::InvalidAddress { .. }
        ));
    }

    #[tokio::test]
    async fn test_direct_client_needs_no_server_to_construct() {
        let client = Client::new("direct://127.0.0.1:1").await.unwrap();
        assert_eq!(client.target(), "127.0.0.1:1");
        assert!(client.policy().is_direct());
        assert_eq!(client.endpoints(), ["127.0.0.1:1"]);
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let client = Client::new("direct://127.0.0.1:1").await.unwrap();
        let ctx = RequestContext::new();
        ctx.cancel.cancel();
        let outcome = client.call(&ctx, HttpRequest::new("GET", "/")).await;
        assert!(matches!(outcome, CallOutcome::Transport(HttpgrpcError::Cancelled)));
    }

    #[tokio::test]
    async fn test_expired_deadline_short_circuits() {
        let client = Client::new("direct://127.0.0.1:1").await.unwrap();
        let ctx = RequestContext::new().with_deadline(Instant::now());
        let response = client
            .call(&ctx, HttpRequest::new("GET", "/"))
            .await
            .into_response();
        assert_eq!(response.code, 504);
    }
}
