use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::protocol::error::{HttpgrpcError, Result};
use crate::protocol::{
    ClientFrame, Code, HttpRequest, HttpResponse, RequestId, RpcRequest, RpcResponse, Status,
    HANDLE_METHOD,
};
use crate::transport::codec::Codec;
use crate::transport::tcp::{Frame, TcpTransport, DEFAULT_MAX_MESSAGE_SIZE};

/// Responses queued per connection before call tasks wait on the writer.
const RESPONSE_QUEUE_DEPTH: usize = 256;

/// The single RPC method, `Handle`, as seen by the server loop.
#[async_trait]
pub trait HttpService: Send + Sync + 'static {
    /// Answer one wire request. `deadline` is the caller's deadline, if it sent one.
    async fn handle(
        &self,
        request: HttpRequest,
        deadline: Option<Instant>,
    ) -> std::result::Result<HttpResponse, Status>;
}

/// RPC server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Frame codec; must match the clients'
    pub codec: Codec,
    /// Largest frame accepted from or written to a client
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }
}

/// Async TCP RPC server.
///
/// Every connection is served by its own task, and every call on a connection
/// by its own task, so one slow handler never holds up other calls.
/// Responses go back through a per-connection writer in completion order.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use httpgrpc_common::transport::{HttpService, RpcServer, ServerConfig};
/// # async fn run(service: Arc<dyn HttpService>) -> httpgrpc_common::Result<()> {
/// let server = RpcServer::bind("0.0.0.0:9095", ServerConfig::default()).await?;
/// server.serve(service).await
/// # }
/// ```
pub struct RpcServer {
    listener: TcpListener,
    config: ServerConfig,
}

impl RpcServer {
    /// Creates a new RPC server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:9095")
    /// * `config` - Codec and frame limits
    pub async fn bind(bind_addr: &str, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            HttpgrpcError::Connection(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        Ok(Self { listener, config })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| HttpgrpcError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Serves until the process exits.
    pub async fn serve(self, service: Arc<dyn HttpService>) -> Result<()> {
        self.serve_with_shutdown(service, CancellationToken::new())
            .await
    }

    /// Serves until `shutdown` is cancelled.
    ///
    /// On shutdown the listener stops accepting, connections stop reading new
    /// calls, and the calls already in flight run to completion before this
    /// returns.
    pub async fn serve_with_shutdown(
        self,
        service: Arc<dyn HttpService>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("RPC server listening on {}", self.local_addr()?);

        let tracker = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            debug!(peer = %peer_addr, "Connection established");

            let service = service.clone();
            let config = self.config.clone();
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                match handle_connection(stream, service, config, shutdown).await {
                    Ok(()) => debug!(peer = %peer_addr, "Connection closed"),
                    Err(e) => warn!(peer = %peer_addr, error = %e, "Connection error"),
                }
            });
        }

        info!("RPC server shutting down, waiting for in-flight calls");
        tracker.close();
        tracker.wait().await;
        Ok(())
    }
}

type InFlight = Arc<Mutex<HashMap<RequestId, AbortHandle>>>;

/// A response waiting for the connection writer.
struct Outgoing {
    response: RpcResponse,
    /// Largest frame the caller accepts
    limit: usize,
}

/// Handle a single TCP connection
///
/// Reads frames until the peer closes the connection or shutdown is signalled.
async fn handle_connection(
    stream: TcpStream,
    service: Arc<dyn HttpService>,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();
    let codec = config.codec;
    let transport = TcpTransport::new().with_max_message_size(config.max_message_size);

    let (tx, mut rx) = mpsc::channel::<Outgoing>(RESPONSE_QUEUE_DEPTH);
    let writer_task = tokio::spawn(async move {
        while let Some(Outgoing { response, limit }) = rx.recv().await {
            let encoded = match encode_within(codec, &response, limit) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(id = response.id, error = %e, "Failed to encode response");
                    continue;
                }
            };
            TcpTransport::send_message(&mut writer, &encoded).await?;
        }
        Ok::<(), HttpgrpcError>(())
    });

    let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
    let mut peer_gone = false;

    let read_result = loop {
        let data = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            read = transport.receive_frame(&mut reader) => match read {
                Ok(Some(Frame::Message(data))) => data,
                Ok(Some(Frame::Oversized { len, head })) => {
                    // Fail the one call; the stream is still in sync.
                    let Some(id) = codec.peek_frame_id(&head) else {
                        peer_gone = true;
                        break Err(HttpgrpcError::MessageTooLarge {
                            size: len,
                            max: config.max_message_size,
                        });
                    };
                    warn!(id, size = len, limit = config.max_message_size, "Request too large");
                    let status = Status::new(
                        Code::ResourceExhausted,
                        format!(
                            "request of {} bytes exceeds the {} byte limit",
                            len, config.max_message_size
                        ),
                    );
                    let rejected = Outgoing {
                        response: RpcResponse::failure(id, status),
                        limit: config.max_message_size,
                    };
                    if tx.send(rejected).await.is_err() {
                        break Ok(());
                    }
                    continue;
                }
                Ok(None) => {
                    peer_gone = true;
                    break Ok(());
                }
                Err(e) => {
                    peer_gone = true;
                    break Err(e);
                }
            },
        };

        // A frame we cannot decode has no id to answer to; drop the connection.
        let frame = match codec.decode_frame(&data) {
            Ok(frame) => frame,
            Err(e) => {
                peer_gone = true;
                break Err(e);
            }
        };

        match frame {
            ClientFrame::Call(request) => {
                start_call(request, &service, &in_flight, &tx, config.max_message_size);
            }
            ClientFrame::Cancel { id } => {
                let handle = lock(&in_flight).remove(&id);
                if let Some(handle) = handle {
                    debug!(id, "Call cancelled by client");
                    handle.abort();
                }
            }
        }
    };

    if peer_gone {
        // Nobody is left to read the answers.
        for (_, handle) in lock(&in_flight).drain() {
            handle.abort();
        }
    }

    drop(tx);
    let write_result = match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(HttpgrpcError::Transport(format!("Writer task failed: {}", e))),
    };

    read_result.and(write_result)
}

/// Spawns the task for one call and registers it so a `Cancel` frame can abort it.
fn start_call(
    request: RpcRequest,
    service: &Arc<dyn HttpService>,
    in_flight: &InFlight,
    tx: &mpsc::Sender<Outgoing>,
    max_message_size: usize,
) {
    let id = request.id;
    debug!(id, method = %request.method, url = %request.payload.url, "Received call");

    let limit = request
        .max_response_size
        .map_or(max_message_size, |max| {
            max_message_size.min(usize::try_from(max).unwrap_or(usize::MAX))
        });

    if request.method != HANDLE_METHOD {
        let tx = tx.clone();
        let status = Status::unimplemented(&request.method);
        tokio::spawn(async move {
            let response = RpcResponse::failure(id, status);
            let _ = tx.send(Outgoing { response, limit }).await;
        });
        return;
    }

    let service = service.clone();
    let timeout_ms = request.timeout_ms;
    let payload = request.payload;

    // Hold the map while spawning so the completion below cannot remove the
    // entry before it is inserted.
    let mut calls = lock(in_flight);

    let call = tokio::spawn(async move {
        match timeout_ms {
            Some(ms) => {
                let budget = Duration::from_millis(ms);
                let deadline = Instant::now() + budget;
                tokio::time::timeout(budget, service.handle(payload, Some(deadline)))
                    .await
                    .unwrap_or_else(|_| Err(Status::deadline_exceeded(ms)))
            }
            None => service.handle(payload, None).await,
        }
    });
    calls.insert(id, call.abort_handle());

    let in_flight = in_flight.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let outcome = match call.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                warn!(id, "Handler panicked");
                Err(Status::internal("handler panicked"))
            }
            Err(_) => Err(Status::cancelled()),
        };
        lock(&in_flight).remove(&id);

        match &outcome {
            Ok(response) => debug!(id, code = response.code, "Call succeeded"),
            Err(status) if status.http_response().is_some() => {
                debug!(id, code = %status.code, "Call failed with application error")
            }
            Err(status) if status.code == Code::Cancelled => debug!(id, "Call aborted"),
            Err(status) => warn!(id, code = %status.code, message = %status.message, "Call failed"),
        }

        let response = RpcResponse { id, outcome };
        let _ = tx.send(Outgoing { response, limit }).await;
    });
}

/// Encodes a response, replacing it with a `ResourceExhausted` failure when
/// the frame would exceed `limit`.
fn encode_within(codec: Codec, response: &RpcResponse, limit: usize) -> Result<Vec<u8>> {
    let encoded = codec.encode_response(response)?;
    if encoded.len() <= limit {
        return Ok(encoded);
    }

    warn!(id = response.id, size = encoded.len(), limit, "Response too large");
    let status = Status::new(
        Code::ResourceExhausted,
        format!(
            "response of {} bytes exceeds the {} byte limit",
            encoded.len(),
            limit
        ),
    );
    codec.encode_response(&RpcResponse::failure(response.id, status))
}

fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashMap<RequestId, AbortHandle>> {
    // A poisoned map only means a holder panicked between two plain map
    // operations; the map itself is still consistent.
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
