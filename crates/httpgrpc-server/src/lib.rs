//! httpgrpc Server
//!
//! This crate exposes an ordinary request/response [`Handler`] as the single
//! `Handle` RPC method, and can also host any handler on a plain HTTP/1.1
//! listener.
//!
//! # Components
//!
//! - [`Server`]: the server adapter; plugs a handler into an [`RpcServer`]
//! - [`HttpServer`]: hyper-based HTTP/1.1 host for any handler
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use http::Response;
//! use hyper::body::Bytes;
//! use httpgrpc_server::{handler_fn, BoxError, RpcServer, Server, ServerConfig};
//!
//! # async fn run() -> httpgrpc_common::Result<()> {
//! let hello = handler_fn(|_ctx, _req| async {
//!     Ok::<_, BoxError>(Response::new(Bytes::from_static(b"world")))
//! });
//!
//! let rpc = RpcServer::bind("0.0.0.0:9095", ServerConfig::default()).await?;
//! rpc.serve(Arc::new(Server::new(hello))).await
//! # }
//! ```

pub mod http_server;
pub mod server;

pub use http_server::HttpServer;
pub use server::Server;

pub use httpgrpc_common::handler::{handler_fn, BoxError, Handler, HandlerFn, RequestContext};
pub use httpgrpc_common::transport::{HttpService, RpcServer, ServerConfig};
