//! # httpgrpc CLI
//!
//! Command-line bridge between plain HTTP services and the httpgrpc
//! transport.
//!
//! - `httpgrpc serve`: expose an existing HTTP service as the `Handle` RPC
//! - `httpgrpc proxy`: accept plain HTTP and forward it to an httpgrpc backend
//! - `httpgrpc call`: make one call against an httpgrpc address
//! - `httpgrpc resolve`: show how an address is interpreted
//!
//! The pieces the binary needs beyond the library crates live here so they
//! can be tested without spawning processes.

pub mod request;
pub mod upstream;

pub use request::{build_request, parse_header};
pub use upstream::UpstreamHandler;
