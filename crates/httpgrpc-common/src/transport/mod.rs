//! httpgrpc Transport Layer
//!
//! This module provides the TCP substrate that carries `Handle` calls.
//!
//! # Architecture
//!
//! - **Transport**: TCP, one long-lived connection per endpoint, many calls in flight
//! - **Codec**: postcard by default, JSON when the traffic needs to be readable
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [encoded frame]`
//!
//! # Components
//!
//! - **[`Codec`]**: Encode/decode client and response frames
//! - **[`TcpTransport`]**: Connecting and length-prefixed framing
//! - **[`RpcServer`]**: Multiplexing server in front of an [`HttpService`]
//! - **[`HttpTransport`]**: Conversions between `http` types and wire messages
//!
//! # Message Size Limits
//!
//! Frames above 100 MB are rejected by default, on both sides. An oversized
//! frame fails only the call it belongs to: the receiver skips its body,
//! recovers the request id from the first bytes and answers or fails that id
//! with `ResourceExhausted`. A client also tells the server how large a reply
//! it accepts, and the server replaces a reply over that size with a
//! `ResourceExhausted` status before writing it.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Instant;
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use httpgrpc_common::{HttpRequest, HttpResponse, Status};
//! use httpgrpc_common::transport::{HttpService, RpcServer, ServerConfig};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl HttpService for Hello {
//!     async fn handle(&self, _req: HttpRequest, _deadline: Option<Instant>) -> Result<HttpResponse, Status> {
//!         Ok(HttpResponse::new(200).with_body("world"))
//!     }
//! }
//!
//! # async fn run() -> httpgrpc_common::Result<()> {
//! let server = RpcServer::bind("127.0.0.1:9095", ServerConfig::default()).await?;
//! server.serve(Arc::new(Hello)).await
//! # }
//! ```

pub mod codec;
pub mod http;
pub mod tcp;
pub mod tcp_server;

pub use codec::Codec;
pub use self::http::HttpTransport;
pub use tcp::{Frame, TcpTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE, OVERSIZED_HEAD_BYTES};
pub use tcp_server::{HttpService, RpcServer, ServerConfig};
