//! CLI Integration Tests
//!
//! Runs the built `httpgrpc` binary against in-process servers on loopback
//! ports.

use std::sync::Arc;

use http::{Request, Response, StatusCode};
use hyper::body::Bytes;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use httpgrpc_server::{handler_fn, BoxError, RequestContext, RpcServer, Server, ServerConfig};

fn httpgrpc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_httpgrpc"))
}

async fn start_server() -> (String, CancellationToken) {
    let handler = handler_fn(|ctx: RequestContext, req: Request<Bytes>| async move {
        let tenant = ctx.tenant.map(|t| t.as_str().to_string()).unwrap_or_default();
        let body = format!("{} {} {} {}", req.method(), req.uri(), tenant, String::from_utf8_lossy(req.body()));
        let mut response = Response::new(Bytes::from(body));
        if req.uri().path() == "/fail" {
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        }
        Ok::<_, BoxError>(response)
    });

    let rpc = RpcServer::bind("127.0.0.1:0", ServerConfig::default())
        .await
        .unwrap();
    let addr = rpc.local_addr().unwrap().to_string();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move { rpc.serve_with_shutdown(Arc::new(Server::new(handler)), token).await });
    (addr, shutdown)
}

#[tokio::test]
async fn test_resolve_prints_target_and_policy() {
    let output = httpgrpc()
        .args(["resolve", "querier.cortex:995"])
        .output()
        .await
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("target: kubernetes://querier:995"));
}

#[tokio::test]
async fn test_resolve_rejects_bad_address() {
    let output = httpgrpc()
        .args(["resolve", "http://querier:995"])
        .output()
        .await
        .unwrap();
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_call_prints_body() {
    let (addr, _shutdown) = start_server().await;

    let target = format!("direct://{}", addr);
    let output = httpgrpc()
        .args([
            "call",
            target.as_str(),
            "/hello?x=1",
            "-X", "POST",
            "-d", "payload",
            "--tenant", "team-a",
        ])
        .output()
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "POST /hello?x=1 team-a payload"
    );
}

#[tokio::test]
async fn test_call_error_status_exits_non_zero() {
    let (addr, _shutdown) = start_server().await;

    let target = format!("direct://{}", addr);
    let output = httpgrpc()
        .args(["call", target.as_str(), "/fail", "-i"])
        .output()
        .await
        .unwrap();
    assert!(!output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("HTTP 500\n"));
    assert!(stdout.ends_with("GET /fail  "));
}

#[tokio::test]
async fn test_call_unreachable_server_reports_500() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let target = format!("direct://{}", addr);
    let output = httpgrpc()
        .args(["call", target.as_str(), "/", "-i"])
        .output()
        .await
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().starts_with("HTTP 500\n"));
}
