//! # httpgrpc
//!
//! Serve and consume ordinary HTTP-style handlers over a binary RPC
//! transport.
//!
//! A [`Server`] wraps any [`Handler`] and exposes it as the single `Handle`
//! RPC method. A [`Client`] is itself a [`Handler`]: requests given to it are
//! shipped to a remote server and the response comes back as if the remote
//! handler had run locally. Handler responses with a status of 400 or above
//! travel as RPC failures that carry the whole response, and the client
//! turns them back into that exact response.
//!
//! ## Crates
//!
//! - [`common`]: wire messages, status convention, framing and the RPC server
//! - [`server`]: the server adapter and an HTTP/1.1 host for handlers
//! - [`client`]: address resolution, discovery, pooling and the client adapter
//!
//! ## Example
//!
//! ```no_run
//! use http::{Request, Response};
//! use hyper::body::Bytes;
//! use tokio_util::sync::CancellationToken;
//! use httpgrpc::{handler_fn, BoxError, Client, HttpRequest, RequestContext, Server, ServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let hello = handler_fn(|_ctx: RequestContext, _req: Request<Bytes>| async {
//!     Ok::<_, BoxError>(Response::new(Bytes::from_static(b"world")))
//! });
//! let shutdown = CancellationToken::new();
//! tokio::spawn(Server::new(hello).serve("127.0.0.1:9095", ServerConfig::default(), shutdown));
//!
//! let client = Client::new("direct://127.0.0.1:9095").await?;
//! let response = client
//!     .call(&RequestContext::new(), HttpRequest::new("GET", "/hello"))
//!     .await
//!     .into_response();
//! assert_eq!(response.body, b"world");
//! # Ok(())
//! # }
//! ```

pub use httpgrpc_client as client;
pub use httpgrpc_common as common;
pub use httpgrpc_server as server;

pub use httpgrpc_client::{parse_address, CallOutcome, Client, ClientConfig, Policy};
pub use httpgrpc_common::{
    handler_fn, BoxError, Code, Handler, HttpRequest, HttpResponse, HttpgrpcError, RequestContext,
    Result, Status, TenantId,
};
pub use httpgrpc_server::{HttpServer, Server, ServerConfig};
