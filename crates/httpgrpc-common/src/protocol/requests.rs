use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use super::tenant::{TenantId, TENANT_HEADER};

pub type RequestId = u64;

/// The one method the service exposes.
pub const HANDLE_METHOD: &str = "Handle";

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A header key with all of its values, in the order they were received.
///
/// Keys are stored lowercase so that a round trip through the wire format
/// compares equal regardless of how the caller spelled them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub values: Vec<String>,
}

/// HTTP-style request as it travels over the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method, e.g. `GET`
    pub method: String,
    /// Path plus encoded query string, e.g. `/api/v1/query?q=up`
    pub url: String,
    /// One entry per distinct key, values in arrival order
    pub headers: Vec<Header>,
    /// Fully materialized body
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        HttpRequest {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header value, keeping any values already present for the key.
    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        append_header(&mut self.headers, key, value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// All values for `key`, matched case-insensitively.
    pub fn header_values(&self, key: &str) -> &[String] {
        header_values(&self.headers, key)
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.header_values(key).first().map(String::as_str)
    }

    /// Tenant carried in the tenant header, if any.
    pub fn tenant(&self) -> Option<TenantId> {
        self.header(TENANT_HEADER)
            .and_then(|value| TenantId::new(value).ok())
    }

    /// Replaces whatever tenant header the request carried.
    pub fn set_tenant(&mut self, tenant: &TenantId) {
        set_header(&mut self.headers, TENANT_HEADER, tenant.as_str().to_string());
    }
}

pub(crate) fn append_header(headers: &mut Vec<Header>, key: &str, value: String) {
    let key = key.to_ascii_lowercase();
    match headers.iter_mut().find(|h| h.key == key) {
        Some(header) => header.values.push(value),
        None => headers.push(Header {
            key,
            values: vec![value],
        }),
    }
}

pub(crate) fn set_header(headers: &mut Vec<Header>, key: &str, value: String) {
    let key = key.to_ascii_lowercase();
    headers.retain(|h| !h.key.eq_ignore_ascii_case(&key));
    headers.push(Header {
        key,
        values: vec![value],
    });
}

pub(crate) fn header_values<'a>(headers: &'a [Header], key: &str) -> &'a [String] {
    headers
        .iter()
        .find(|h| h.key.eq_ignore_ascii_case(key))
        .map(|h| h.values.as_slice())
        .unwrap_or(&[])
}

/// An RPC call frame: one invocation of a method with a wire request payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcRequest {
    pub id: RequestId,
    pub method: String,
    pub payload: HttpRequest,
    /// Caller's remaining time budget, enforced by the server
    pub timeout_ms: Option<u64>,
    /// Largest reply frame the caller will accept
    pub max_response_size: Option<u64>,
}

impl RpcRequest {
    /// Creates a `Handle` call with a fresh request id.
    pub fn new(payload: HttpRequest) -> Self {
        RpcRequest {
            id: generate_request_id(),
            method: HANDLE_METHOD.to_string(),
            payload,
            timeout_ms: None,
            max_response_size: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_max_response_size(mut self, max: usize) -> Self {
        self.max_response_size = Some(max as u64);
        self
    }
}

/// Frames sent from client to server on a multiplexed connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientFrame {
    Call(RpcRequest),
    /// The caller gave up on the call; the server should abort it.
    Cancel { id: RequestId },
}

impl ClientFrame {
    pub fn id(&self) -> RequestId {
        match self {
            ClientFrame::Call(request) => request.id,
            ClientFrame::Cancel { id } => *id,
        }
    }
}

fn generate_request_id() -> RequestId {
    // Try to use system time as the base
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    // Upper 32 bits from the clock, lower 32 bits from the counter
    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
