use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::error::{HttpgrpcError, Result};

/// Default timeout for establishing a TCP connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum message size (100 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Leading bytes kept from a frame that was too large to accept.
pub const OVERSIZED_HEAD_BYTES: usize = 64;

/// One frame read off a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(Vec<u8>),
    /// A frame over the size limit. Only its first [`OVERSIZED_HEAD_BYTES`]
    /// were kept; the rest was read and discarded so the stream stays in sync.
    Oversized { len: usize, head: Vec<u8> },
}

/// Async TCP transport for httpgrpc.
///
/// Owns the framing rules shared by the client connection and the RPC server.
///
/// # Wire Protocol
///
/// Messages are sent with a 4-byte length prefix (big-endian u32) followed
/// by the encoded frame:
///
/// ```text
/// [4-byte length] [encoded frame]
/// ```
///
/// # Example
///
/// ```no_run
/// use httpgrpc_common::transport::{Codec, TcpTransport};
/// use httpgrpc_common::protocol::{ClientFrame, HttpRequest, RpcRequest};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransport::new();
/// let mut stream = transport.connect("127.0.0.1:9095").await?;
///
/// let frame = ClientFrame::Call(RpcRequest::new(HttpRequest::new("GET", "/hello")));
/// let encoded = Codec::default().encode_frame(&frame)?;
/// TcpTransport::send_message(&mut stream, &encoded).await?;
/// let reply = transport.receive_message(&mut stream).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    max_message_size: usize,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several socket addresses; each is tried in
    /// turn until one accepts the connection within the connect timeout.
    pub async fn connect(&self, addr: &str) -> Result<TcpStream> {
        let socket_addrs = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| HttpgrpcError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        // Try each resolved address until one succeeds
        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true).map_err(|e| {
                        HttpgrpcError::Connection(format!("Failed to set TCP_NODELAY: {}", e))
                    })?;
                    return Ok(stream);
                }
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => {
                    last_err = Some(format!(
                        "timed out after {}ms",
                        self.connect_timeout.as_millis()
                    ))
                }
            }
        }

        Err(HttpgrpcError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Sends a message with length prefix.
    ///
    /// Wire format: `[4-byte length as u32 big-endian] + [data]`
    pub async fn send_message<W>(stream: &mut W, data: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let len = u32::try_from(data.len()).map_err(|_| {
            HttpgrpcError::InvalidRequest(format!("Message too large: {} bytes", data.len()))
        })?;

        let mut buf = Vec::with_capacity(4 + data.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(data);

        stream
            .write_all(&buf)
            .await
            .map_err(|e| Self::map_io_error(e, "writing frame"))?;

        // Flush to ensure data is sent
        stream
            .flush()
            .await
            .map_err(|e| Self::map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Receives a message with length prefix.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly between
    /// two frames.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The connection drops in the middle of a frame
    /// - The message exceeds the configured maximum size
    pub async fn receive_message<R>(&self, stream: &mut R) -> Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        match self.receive_frame(stream).await? {
            None => Ok(None),
            Some(Frame::Message(buf)) => Ok(Some(buf)),
            Some(Frame::Oversized { len, .. }) => Err(HttpgrpcError::MessageTooLarge {
                size: len,
                max: self.max_message_size,
            }),
        }
    }

    /// Receives one frame, skipping over the body of an oversized one.
    ///
    /// Unlike [`receive_message`](Self::receive_message), a frame above the
    /// size limit leaves the stream usable: the caller gets its head and can
    /// fail just that call.
    pub async fn receive_frame<R>(&self, stream: &mut R) -> Result<Option<Frame>>
    where
        R: AsyncRead + Unpin,
    {
        // Read length prefix
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Self::map_io_error(e, "reading length prefix")),
        }

        let len = u32::from_be_bytes(len_buf) as usize;

        // Never allocate more than the limit for a single frame
        if len > self.max_message_size {
            let mut head = vec![0u8; len.min(OVERSIZED_HEAD_BYTES)];
            stream
                .read_exact(&mut head)
                .await
                .map_err(|e| Self::map_io_error(e, "reading data"))?;

            let rest = (len - head.len()) as u64;
            let skipped = tokio::io::copy(&mut (&mut *stream).take(rest), &mut tokio::io::sink())
                .await
                .map_err(|e| Self::map_io_error(e, "discarding data"))?;
            if skipped < rest {
                return Err(HttpgrpcError::Connection(
                    "discarding data: Connection lost".to_string(),
                ));
            }

            return Ok(Some(Frame::Oversized { len, head }));
        }

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| Self::map_io_error(e, "reading data"))?;

        Ok(Some(Frame::Message(buf)))
    }

    /// Map IO errors to appropriate HttpgrpcError variants
    ///
    /// - Timeouts/would block -> `Timeout`
    /// - Connection errors -> `Connection`
    /// - Other IO errors -> `Io`
    fn map_io_error(err: std::io::Error, context: &str) -> HttpgrpcError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                HttpgrpcError::Timeout(DEFAULT_CONNECT_TIMEOUT.as_millis() as u64)
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::NotConnected => {
                HttpgrpcError::Connection(format!("{}: Connection lost", context))
            }
            _ => HttpgrpcError::Io(err),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let transport = TcpTransport::new();

        TcpTransport::send_message(&mut client, b"hello").await.unwrap();
        TcpTransport::send_message(&mut client, b"").await.unwrap();

        assert_eq!(
            transport.receive_message(&mut server).await.unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(
            transport.receive_message(&mut server).await.unwrap(),
            Some(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_clean_eof_between_frames() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let transport = TcpTransport::new();
        assert_eq!(transport.receive_message(&mut server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let transport = TcpTransport::new();
        let err = transport.receive_message(&mut server).await.unwrap_err();
        assert!(matches!(err, HttpgrpcError::Connection(_)));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        TcpTransport::send_message(&mut client, &[7u8; 1024]).await.unwrap();

        let transport = TcpTransport::new().with_max_message_size(16);
        let err = transport.receive_message(&mut server).await.unwrap_err();
        assert!(matches!(
            err,
            HttpgrpcError::MessageTooLarge { size: 1024, max: 16 }
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_skipped() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let transport = TcpTransport::new().with_max_message_size(16);

        let writer = tokio::spawn(async move {
            let mut big = vec![1u8, 2, 3];
            big.resize(10_000, 9);
            TcpTransport::send_message(&mut client, &big).await.unwrap();
            TcpTransport::send_message(&mut client, b"next").await.unwrap();
        });

        match transport.receive_frame(&mut server).await.unwrap() {
            Some(Frame::Oversized { len, head }) => {
                assert_eq!(len, 10_000);
                assert_eq!(head.len(), OVERSIZED_HEAD_BYTES);
                assert_eq!(&head[..3], &[1, 2, 3]);
            }
            other => panic!("expected an oversized frame, got {:?}", other),
        }

        // The following frame is read normally
        assert_eq!(
            transport.receive_frame(&mut server).await.unwrap(),
            Some(Frame::Message(b"next".to_vec()))
        );
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_inside_oversized_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(&1024u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0u8; 100]).await.unwrap();
        drop(client);

        let transport = TcpTransport::new().with_max_message_size(16);
        let err = transport.receive_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, HttpgrpcError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpTransport::new().connect(&addr).await.unwrap_err();
        assert!(matches!(err, HttpgrpcError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connect_invalid_address() {
        let err = TcpTransport::new().connect("no-port-here").await.unwrap_err();
        assert!(matches!(err, HttpgrpcError::Connection(_)));
    }
}
