//! httpgrpc Response Types
//!
//! This module defines the wire response and the RPC response frame.

use serde::{Deserialize, Serialize};

use super::requests::{append_header, header_values, Header, RequestId};
use super::status::Status;

/// HTTP-style response as it travels over the wire.
///
/// # Example
///
/// ```
/// use httpgrpc_common::protocol::responses::HttpResponse;
///
/// let response = HttpResponse::new(200)
///     .with_header("Content-Type", "text/plain")
///     .with_body("world");
///
/// assert!(!response.is_error());
/// assert_eq!(response.header("content-type"), Some("text/plain"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code (100-599)
    pub code: u16,
    /// One entry per distinct key, values in the order the handler set them
    pub headers: Vec<Header>,
    /// Fully materialized body
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(code: u16) -> Self {
        HttpResponse {
            code,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A plain-text response, used for locally synthesized errors.
    pub fn text(code: u16, body: impl Into<String>) -> Self {
        HttpResponse::new(code)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        append_header(&mut self.headers, key, value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header_values(&self, key: &str) -> &[String] {
        header_values(&self.headers, key)
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.header_values(key).first().map(String::as_str)
    }

    /// Whether this response is shipped under the status-as-error convention.
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}

/// An RPC response frame.
///
/// # Response Flow
///
/// 1. Server receives an [`RpcRequest`](super::RpcRequest) frame
/// 2. The service answers with a wire response or fails with a [`Status`]
/// 3. The frame is encoded and written back on the same connection
/// 4. The client matches it to the pending call by `id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcResponse {
    /// Request identifier this response corresponds to
    pub id: RequestId,
    /// Successful wire response, or the status the call failed with
    pub outcome: Result<HttpResponse, Status>,
}

impl RpcResponse {
    pub fn success(id: RequestId, response: HttpResponse) -> Self {
        RpcResponse {
            id,
            outcome: Ok(response),
        }
    }

    pub fn failure(id: RequestId, status: Status) -> Self {
        RpcResponse {
            id,
            outcome: Err(status),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
