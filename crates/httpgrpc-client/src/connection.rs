use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use httpgrpc_common::transport::{Codec, Frame, TcpTransport};
use httpgrpc_common::{
    ClientFrame, Code, HttpResponse, HttpgrpcError, RequestId, Result, RpcRequest, Status,
};

/// Frames queued for the writer before callers wait for room.
const REQUEST_QUEUE_DEPTH: usize = 256;

/// What the server answered: a response, or the status the call failed with.
pub type Reply = std::result::Result<HttpResponse, Status>;
type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Reply>>>>;

/// One multiplexed connection to a server endpoint.
///
/// Any number of calls may be in flight at once; replies are matched to
/// callers by request id. When the socket fails every pending call fails with
/// a connection error and the connection stays closed. A frame over the size
/// limit in either direction fails only its own call.
pub struct Connection {
    addr: String,
    codec: Codec,
    max_message_size: usize,
    frames: mpsc::Sender<Vec<u8>>,
    pending: Pending,
    closed: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    pub async fn connect(addr: &str, transport: &TcpTransport, codec: Codec) -> Result<Self> {
        let stream = transport.connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();
        let (frames, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);

        let writer = tokio::spawn(write_loop(
            addr.to_string(),
            write_half,
            rx,
            closed.clone(),
        ));
        let reader = tokio::spawn(read_loop(
            addr.to_string(),
            read_half,
            transport.clone(),
            codec,
            pending.clone(),
            closed.clone(),
        ));

        debug!(addr, "Connected");

        Ok(Self {
            addr: addr.to_string(),
            codec,
            max_message_size: transport.max_message_size(),
            frames,
            pending,
            closed,
            reader,
            writer,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of calls waiting for a reply.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Runs one call to completion.
    ///
    /// The call is abandoned when `cancel` fires, when `deadline` passes, or
    /// when the returned future is dropped; in each case the server is told
    /// to abort it. A request frame over the size limit is never sent and
    /// fails with [`HttpgrpcError::MessageTooLarge`].
    pub async fn call(
        &self,
        request: RpcRequest,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Reply> {
        let id = request.id;
        let budget_ms = remaining_budget_ms(deadline);
        let request = request.with_max_response_size(self.max_message_size);
        let encoded = self.codec.encode_frame(&ClientFrame::Call(request))?;
        if encoded.len() > self.max_message_size {
            return Err(HttpgrpcError::MessageTooLarge {
                size: encoded.len(),
                max: self.max_message_size,
            });
        }

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let mut guard = CallGuard {
            connection: self,
            id,
            finished: false,
        };

        if self.is_closed() {
            guard.finished = true;
            return Err(self.closed_error());
        }

        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(expired);

        // Until the frame is queued the server has nothing to cancel.
        tokio::select! {
            sent = self.frames.send(encoded) => {
                if sent.is_err() {
                    guard.finished = true;
                    return Err(self.closed_error());
                }
            }
            _ = self.closed.cancelled() => {
                guard.finished = true;
                return Err(self.closed_error());
            }
            _ = cancel.cancelled() => {
                guard.finished = true;
                return Err(HttpgrpcError::Cancelled);
            }
            _ = &mut expired => {
                guard.finished = true;
                return Err(HttpgrpcError::Timeout(budget_ms));
            }
        }

        tokio::select! {
            reply = rx => {
                guard.finished = true;
                reply.map_err(|_| self.closed_error())
            }
            _ = self.closed.cancelled() => {
                guard.finished = true;
                Err(self.closed_error())
            }
            _ = cancel.cancelled() => Err(HttpgrpcError::Cancelled),
            _ = &mut expired => Err(HttpgrpcError::Timeout(budget_ms)),
        }
    }

    fn send_cancel(&self, id: RequestId) {
        let encoded = match self.codec.encode_frame(&ClientFrame::Cancel { id }) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(addr = %self.addr, id, error = %e, "Failed to encode cancel frame");
                return;
            }
        };
        // Runs from Drop, so it cannot wait for room; the server's own
        // deadline still ends the call.
        if let Err(mpsc::error::TrySendError::Full(_)) = self.frames.try_send(encoded) {
            debug!(addr = %self.addr, id, "Outbound queue full, cancel frame dropped");
        }
    }

    fn closed_error(&self) -> HttpgrpcError {
        HttpgrpcError::Connection(format!("connection to {} closed", self.addr))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.closed.cancel();
        self.reader.abort();
        self.writer.abort();
    }
}

/// Removes an abandoned call and tells the server to stop working on it.
struct CallGuard<'a> {
    connection: &'a Connection,
    id: RequestId,
    finished: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let was_pending = lock(&self.connection.pending).remove(&self.id).is_some();
        if !self.finished && was_pending && !self.connection.is_closed() {
            debug!(addr = %self.connection.addr, id = self.id, "Abandoning call");
            self.connection.send_cancel(self.id);
        }
    }
}

async fn write_loop(
    addr: String,
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::Receiver<Vec<u8>>,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if let Err(e) = TcpTransport::send_message(&mut writer, &frame).await {
            warn!(addr = %addr, error = %e, "Write failed, closing connection");
            break;
        }
    }
    closed.cancel();
}

async fn read_loop(
    addr: String,
    mut reader: OwnedReadHalf,
    transport: TcpTransport,
    codec: Codec,
    pending: Pending,
    closed: CancellationToken,
) {
    loop {
        let data = tokio::select! {
            _ = closed.cancelled() => break,
            read = transport.receive_frame(&mut reader) => match read {
                Ok(Some(Frame::Message(data))) => data,
                Ok(Some(Frame::Oversized { len, head })) => {
                    let Some(id) = codec.peek_response_id(&head) else {
                        warn!(addr = %addr, size = len, "Oversized response without an id, closing connection");
                        break;
                    };
                    warn!(addr = %addr, id, size = len, "Response too large");
                    let waiter = lock(&pending).remove(&id);
                    if let Some(waiter) = waiter {
                        let _ = waiter.send(Err(Status::new(
                            Code::ResourceExhausted,
                            format!(
                                "response of {} bytes exceeds the {} byte limit",
                                len,
                                transport.max_message_size()
                            ),
                        )));
                    }
                    continue;
                }
                Ok(None) => {
                    debug!(addr = %addr, "Server closed connection");
                    break;
                }
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Read failed, closing connection");
                    break;
                }
            },
        };

        let response = match codec.decode_response(&data) {
            Ok(response) => response,
            Err(e) => {
                warn!(addr = %addr, error = %e, "Undecodable response, closing connection");
                break;
            }
        };

        let waiter = lock(&pending).remove(&response.id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(response.outcome);
            }
            // Reply to a call the caller already gave up on
            None => debug!(addr = %addr, id = response.id, "Dropping unmatched response"),
        }
    }

    closed.cancel();
    // Dropping the senders fails every waiting call
    lock(&pending).clear();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn remaining_budget_ms(deadline: Option<Instant>) -> u64 {
    deadline
        .map(|d| d.saturating_duration_since(Instant::now()).as_millis() as u64)
        .unwrap_or(0)
}
