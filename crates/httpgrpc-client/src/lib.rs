//! httpgrpc Client
//!
//! The client adapter: a [`Handler`](httpgrpc_common::Handler) that forwards
//! every request over the binary RPC transport to a remote httpgrpc server.
//!
//! # Addresses
//!
//! - `direct://host:port` dials exactly that endpoint
//! - `kubernetes://service:port` keeps a pool fed by a naming service
//! - `service[.namespace]:port` is shorthand for `kubernetes://service:port`
//!
//! # Components
//!
//! - [`resolver`]: address parsing into a target and a [`Policy`]
//! - [`discovery`]: naming services ([`StaticNamingService`], [`DnsNamingService`])
//! - [`balancer`]: round-robin over the live endpoint set
//! - [`connection`]: one multiplexed connection per endpoint
//! - [`channel`]: the pool, connection cache and discovery watcher a client owns
//! - [`Client`]: the adapter itself
//!
//! # Example
//!
//! ```no_run
//! use httpgrpc_client::Client;
//! use httpgrpc_common::{HttpRequest, RequestContext, TenantId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("direct://127.0.0.1:9095").await?;
//!     let ctx = RequestContext::new().with_tenant(TenantId::new("team-a")?);
//!
//!     let response = client
//!         .call(&ctx, HttpRequest::new("GET", "/api/v1/query?query=up"))
//!         .await
//!         .into_response();
//!     println!("{} {}", response.code, String::from_utf8_lossy(&response.body));
//!     Ok(())
//! }
//! ```

pub mod balancer;
pub mod channel;
pub mod client;
pub mod connection;
pub mod discovery;
pub mod resolver;

pub use balancer::LoadBalancer;
pub use channel::Channel;
pub use client::{CallOutcome, Client, ClientBuilder, ClientConfig};
pub use connection::Connection;
pub use discovery::{DnsConfig, DnsNamingService, NamingService, StaticNamingService};
pub use resolver::{parse_address, DiscoveryTarget, Policy};
