//! Server adapter integration tests
//!
//! These tests serve a handler over a real loopback RPC listener and talk to
//! it with raw frames, the way any client of the `Handle` method would.

use std::net::SocketAddr;
use std::time::Duration;

use http::{Request, Response};
use hyper::body::Bytes;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use httpgrpc_common::transport::{Codec, TcpTransport};
use httpgrpc_common::{ClientFrame, HttpRequest, RpcRequest, RpcResponse, TENANT_HEADER};
use httpgrpc_server::{handler_fn, BoxError, RequestContext, Server, ServerConfig};

async fn start_server() -> SocketAddr {
    let handler = handler_fn(|ctx: RequestContext, req: Request<Bytes>| async move {
        match req.uri().path() {
            "/hello" => Ok::<_, BoxError>(Response::new(Bytes::from_static(b"world"))),
            "/error" => Ok(Response::builder()
                .status(500)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(Bytes::from_static(b"foo\n"))?),
            "/tenant" => Ok(Response::new(Bytes::from(
                ctx.tenant.map(|t| t.to_string()).unwrap_or_default(),
            ))),
            "/slow" => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Response::new(Bytes::from(req.uri().query().unwrap_or("").to_string())))
            }
            _ => Ok(Response::builder().status(404).body(Bytes::new())?),
        }
    });

    let listener = httpgrpc_server::RpcServer::bind("127.0.0.1:0", ServerConfig::default())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        listener
            .serve_with_shutdown(std::sync::Arc::new(Server::new(handler)), CancellationToken::new())
            .await
    });
    addr
}

async fn round_trip(stream: &mut TcpStream, request: HttpRequest) -> RpcResponse {
    let codec = Codec::default();
    let frame = ClientFrame::Call(RpcRequest::new(request));
    TcpTransport::send_message(stream, &codec.encode_frame(&frame).unwrap())
        .await
        .unwrap();
    let data = TcpTransport::new()
        .receive_message(stream)
        .await
        .unwrap()
        .unwrap();
    codec.decode_response(&data).unwrap()
}

#[tokio::test]
async fn test_basic() {
    let addr = start_server().await;
    let mut stream = TcpTransport::new().connect(&addr.to_string()).await.unwrap();

    let response = round_trip(&mut stream, HttpRequest::new("GET", "/hello"))
        .await
        .outcome
        .unwrap();
    assert_eq!(response.code, 200);
    assert_eq!(response.body, b"world");
}

#[tokio::test]
async fn test_error_travels_as_status() {
    let addr = start_server().await;
    let mut stream = TcpTransport::new().connect(&addr.to_string()).await.unwrap();

    let status = round_trip(&mut stream, HttpRequest::new("GET", "/error"))
        .await
        .outcome
        .unwrap_err();
    let response = status.http_response().expect("embedded response");
    assert_eq!(response.code, 500);
    assert_eq!(response.body, b"foo\n");
    assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
}

#[tokio::test]
async fn test_tenant_header_becomes_context() {
    let addr = start_server().await;
    let mut stream = TcpTransport::new().connect(&addr.to_string()).await.unwrap();

    let request = HttpRequest::new("GET", "/tenant").with_header(TENANT_HEADER, "org-7");
    let response = round_trip(&mut stream, request).await.outcome.unwrap();
    assert_eq!(response.body, b"org-7");
}

#[tokio::test]
async fn test_concurrent_connections() {
    let addr = start_server().await;

    let calls = (0..10).map(|i| async move {
        let mut stream = TcpTransport::new().connect(&addr.to_string()).await.unwrap();
        let request = HttpRequest::new("GET", format!("/slow?n={}", i));
        let response = round_trip(&mut stream, request).await.outcome.unwrap();
        (i, response.body)
    });

    for (i, body) in futures::future::join_all(calls).await {
        assert_eq!(body, format!("n={}", i).into_bytes());
    }
}
