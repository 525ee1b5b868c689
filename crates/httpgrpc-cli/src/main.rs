//! # httpgrpc CLI Entry Point
//!
//! Main binary for httpgrpc. Bridges plain HTTP services and the binary RPC
//! transport in both directions, and makes one-off calls for debugging.
//!
//! ## Usage
//!
//! ```bash
//! # Expose an HTTP service on :9095 as the Handle RPC
//! httpgrpc serve -b 0.0.0.0:9095 --upstream http://127.0.0.1:8080
//!
//! # Accept plain HTTP on :8080 and forward it to a cluster service
//! httpgrpc proxy -b 0.0.0.0:8080 --backend querier.cortex:9095
//!
//! # One call, body to stdout
//! httpgrpc call direct://127.0.0.1:9095 /api/v1/labels --tenant team-a
//!
//! # Show how an address is interpreted
//! httpgrpc resolve querier.cortex:9095
//! ```
//!
//! ## Environment
//!
//! - `HTTPGRPC_UPSTREAM`: default for `serve --upstream`
//! - `HTTPGRPC_ADDRESS`: default for `proxy --backend`
//! - `RUST_LOG`: log filter, `info` when unset

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use httpgrpc_cli::{build_request, UpstreamHandler};
use httpgrpc_client::{parse_address, Client, ClientConfig};
use httpgrpc_common::transport::{Codec, DEFAULT_MAX_MESSAGE_SIZE};
use httpgrpc_common::{RequestContext, TenantId};
use httpgrpc_server::{HttpServer, Server, ServerConfig};

const UPSTREAM_ENV: &str = "HTTPGRPC_UPSTREAM";
const ADDRESS_ENV: &str = "HTTPGRPC_ADDRESS";

#[derive(FromArgs)]
/// httpgrpc - HTTP-style handlers over a binary RPC transport
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: server adapter in front of a plain HTTP service
/// - **Proxy**: plain HTTP listener in front of the client adapter
/// - **Call**: a single request (body on stdout, for scripting)
/// - **Resolve**: print the target and policy of an address
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Proxy(ProxyArgs),
    Call(CallArgs),
    Resolve(ResolveArgs),
}

/// Arguments for exposing an HTTP service over httpgrpc.
///
/// Every inbound `Handle` call is replayed against the upstream with the
/// same method, path, headers and body. Upstream responses of 400 and above
/// travel back as RPC failures carrying the full response.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve an HTTP service as the httpgrpc Handle RPC
struct ServeArgs {
    /// address to bind the RPC listener to
    #[argh(option, short = 'b', default = "\"0.0.0.0:9095\".into()")]
    bind: String,

    /// base URL of the HTTP service to forward to
    ///
    /// Falls back to the HTTPGRPC_UPSTREAM environment variable.
    #[argh(option, short = 'u')]
    upstream: Option<String>,

    /// frame codec, `postcard` (default) or `json`
    #[argh(option, default = "Codec::Postcard")]
    codec: Codec,

    /// largest accepted frame in bytes
    #[argh(option, long = "max-message-size", default = "DEFAULT_MAX_MESSAGE_SIZE")]
    max_message_size: usize,
}

/// Arguments for fronting an httpgrpc backend with plain HTTP.
#[derive(FromArgs)]
#[argh(subcommand, name = "proxy")]
/// accept plain HTTP and forward it to an httpgrpc backend
struct ProxyArgs {
    /// address to bind the HTTP listener to
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// backend address: `direct://host:port`, `kubernetes://service:port`
    /// or `service[.namespace]:port`
    ///
    /// Falls back to the HTTPGRPC_ADDRESS environment variable.
    #[argh(option)]
    backend: Option<String>,

    /// per-call timeout in milliseconds, none by default
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// frame codec, `postcard` (default) or `json`
    #[argh(option, default = "Codec::Postcard")]
    codec: Codec,
}

/// Arguments for a single call.
///
/// The response body is written to stdout as-is. A status of 400 or above
/// is reported on stderr and exits non-zero.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// make one request against an httpgrpc address
struct CallArgs {
    /// address of the server to call
    #[argh(positional)]
    address: String,

    /// request path plus query, e.g. /api/v1/query?query=up
    #[argh(positional)]
    path: String,

    /// request method
    #[argh(option, short = 'X', default = "\"GET\".into()")]
    method: String,

    /// request header as `Key: value`, repeatable
    #[argh(option, short = 'H', long = "header")]
    headers: Vec<String>,

    /// request body
    #[argh(option, short = 'd', long = "data")]
    data: Option<String>,

    /// tenant to send in the tenant header
    #[argh(option)]
    tenant: Option<String>,

    /// call timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,

    /// print the status line and headers before the body
    #[argh(switch, short = 'i')]
    include: bool,

    /// frame codec, `postcard` (default) or `json`
    #[argh(option, default = "Codec::Postcard")]
    codec: Codec,
}

/// Arguments for inspecting an address.
#[derive(FromArgs)]
#[argh(subcommand, name = "resolve")]
/// print how an address is interpreted
struct ResolveArgs {
    /// address to parse
    #[argh(positional)]
    address: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call and resolve write to stdout for scripting; keep logs out of it
    if !matches!(cli.command, Commands::Call(_) | Commands::Resolve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Proxy(args) => run_proxy(args).await,
        Commands::Call(args) => run_call(args).await,
        Commands::Resolve(args) => run_resolve(args),
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let upstream = args
        .upstream
        .or_else(|| std::env::var(UPSTREAM_ENV).ok())
        .ok_or_else(|| anyhow::anyhow!("No upstream given; use --upstream or {}", UPSTREAM_ENV))?;
    let handler = UpstreamHandler::new(&upstream)?;

    tracing::info!("Forwarding Handle calls to {}", handler.base());
    tracing::info!("Codec: {:?}", args.codec);

    let config = ServerConfig::default()
        .with_codec(args.codec)
        .with_max_message_size(args.max_message_size);

    Server::new(handler)
        .serve(&args.bind, config, shutdown_on_ctrl_c())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn run_proxy(args: ProxyArgs) -> Result<()> {
    let backend = args
        .backend
        .or_else(|| std::env::var(ADDRESS_ENV).ok())
        .ok_or_else(|| anyhow::anyhow!("No backend given; use --backend or {}", ADDRESS_ENV))?;

    let mut config = ClientConfig::default().with_codec(args.codec);
    if let Some(ms) = args.timeout_ms {
        config = config.with_default_timeout(Duration::from_millis(ms));
    }

    let client = Client::builder(backend.as_str()).config(config).build().await?;
    tracing::info!(
        "Forwarding HTTP to {} ({}, {} endpoints)",
        client.target(),
        client.policy(),
        client.endpoints().len()
    );

    let listener = TcpListener::bind(&args.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", args.bind, e))?;
    HttpServer::new(client)
        .serve(listener, shutdown_on_ctrl_c())
        .await?;

    tracing::info!("Proxy stopped");
    Ok(())
}

/// Executes the `call` subcommand.
///
/// No tracing is initialized for this command so stdout carries only the
/// response body.
async fn run_call(args: CallArgs) -> Result<()> {
    let request = build_request(&args.method, &args.path, &args.headers, args.data.as_deref())?;

    let mut ctx = RequestContext::new().with_timeout(Duration::from_millis(args.timeout_ms));
    if let Some(tenant) = args.tenant {
        ctx = ctx.with_tenant(TenantId::new(tenant)?);
    }

    let client = Client::builder(args.address.as_str())
        .config(ClientConfig::default().with_codec(args.codec))
        .build()
        .await?;
    let response = client.call(&ctx, request).await.into_response();

    let mut stdout = std::io::stdout().lock();
    if args.include {
        writeln!(stdout, "HTTP {}", response.code)?;
        for header in &response.headers {
            for value in &header.values {
                writeln!(stdout, "{}: {}", header.key, value)?;
            }
        }
        writeln!(stdout)?;
    }
    stdout.write_all(&response.body)?;
    stdout.flush()?;

    if response.is_error() {
        anyhow::bail!("request failed with status {}", response.code);
    }
    Ok(())
}

fn run_resolve(args: ResolveArgs) -> Result<()> {
    let (target, policy) = parse_address(&args.address)?;
    println!("target: {}", target);
    println!("policy: {}", policy);
    Ok(())
}

/// A token cancelled on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutting down"),
            Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {}", e),
        }
        token.cancel();
    });
    shutdown
}
