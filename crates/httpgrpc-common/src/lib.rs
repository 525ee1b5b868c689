//! httpgrpc Common Types and Transport
//!
//! This crate provides the wire message definitions and the TCP RPC substrate
//! shared by the httpgrpc server and client adapters.
//!
//! # Overview
//!
//! httpgrpc lets ordinary HTTP-style handlers be served and consumed over a
//! binary RPC transport. This crate contains the pieces both sides agree on:
//!
//! - **Protocol Layer**: wire request/response messages, RPC frames, status codes
//!   and the status-as-error convention, tenant propagation
//! - **Transport Layer**: length-prefixed framing, codecs, the multiplexing RPC server
//!   and conversions between `http` types and wire messages
//!
//! # Architecture
//!
//! The wire protocol is deliberately small:
//! - **Transport**: TCP, one long-lived connection carrying many concurrent calls
//! - **Serialization**: postcard (binary) by default, JSON for debugging
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [encoded frame]`
//! - **Max Message Size**: 100 MB by default (prevents memory exhaustion)
//!
//! # Components
//!
//! - [`handler`] - The [`Handler`] interface and explicit [`RequestContext`]
//! - [`protocol`] - Wire messages, frames, [`Status`] and [`HttpgrpcError`]
//! - [`transport`] - Codec, framing, [`RpcServer`](transport::RpcServer) and http conversions
//!
//! # Example
//!
//! ```
//! use httpgrpc_common::{HttpResponse, Status};
//!
//! // A handler answered 404: the server side ships it as an RPC failure...
//! let response = HttpResponse::new(404).with_body("not found");
//! let status = Status::from_http_response(&response);
//!
//! // ...and the client side recovers the exact response from the details.
//! assert_eq!(status.http_response(), Some(response));
//! ```

pub mod handler;
pub mod protocol;
pub mod transport;

pub use handler::{handler_fn, BoxError, Handler, HandlerFn, RequestContext};
pub use protocol::*;
