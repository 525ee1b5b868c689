//! RPC status codes and the status-as-error convention.
//!
//! A call either succeeds with an [`HttpResponse`] or fails with a [`Status`].
//! Handlers that answer with an HTTP status of 400 or above are shipped as
//! failures so that anything watching the RPC layer sees them as errors, but
//! the full response travels along in the status details and the client
//! recovers it byte for byte.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::responses::HttpResponse;

/// Type tag of a status detail that embeds an [`HttpResponse`].
pub const HTTP_RESPONSE_TYPE_URL: &str = "type.httpgrpc/httpgrpc.HTTPResponse";

/// Most body bytes copied into the message of an application error status.
pub const MAX_STATUS_MESSAGE_BYTES: usize = 256;

/// Canonical RPC status codes (gRPC numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Parse a status code from an integer value.
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => Self::Ok,
            1 => Self::Cancelled,
            2 => Self::Unknown,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    /// Closest canonical code for an HTTP status, so RPC-level tooling can
    /// classify application failures.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            100..=399 => Self::Ok,
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::Aborted,
            412 => Self::FailedPrecondition,
            416 => Self::OutOfRange,
            429 => Self::ResourceExhausted,
            499 => Self::Cancelled,
            400..=498 => Self::InvalidArgument,
            501 => Self::Unimplemented,
            503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            500..=599 => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            Self::DeadlineExceeded => write!(f, "DEADLINE_EXCEEDED"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::AlreadyExists => write!(f, "ALREADY_EXISTS"),
            Self::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            Self::ResourceExhausted => write!(f, "RESOURCE_EXHAUSTED"),
            Self::FailedPrecondition => write!(f, "FAILED_PRECONDITION"),
            Self::Aborted => write!(f, "ABORTED"),
            Self::OutOfRange => write!(f, "OUT_OF_RANGE"),
            Self::Unimplemented => write!(f, "UNIMPLEMENTED"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::DataLoss => write!(f, "DATA_LOSS"),
            Self::Unauthenticated => write!(f, "UNAUTHENTICATED"),
        }
    }
}

/// A typed, opaque attachment on a [`Status`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Detail {
    pub type_url: String,
    pub value: Vec<u8>,
}

/// The failure outcome of an RPC call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub message: String,
    pub details: Vec<Detail>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Status {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unimplemented(method: &str) -> Self {
        Self::new(Code::Unimplemented, format!("unknown method {}", method))
    }

    pub fn deadline_exceeded(timeout_ms: u64) -> Self {
        Self::new(
            Code::DeadlineExceeded,
            format!("deadline of {}ms exceeded", timeout_ms),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(Code::Cancelled, "call cancelled by client")
    }

    pub fn with_detail(mut self, type_url: impl Into<String>, value: Vec<u8>) -> Self {
        self.details.push(Detail {
            type_url: type_url.into(),
            value,
        });
        self
    }

    /// Encodes an application response as a failure carrying it in its details.
    ///
    /// The message holds at most [`MAX_STATUS_MESSAGE_BYTES`] of the body; the
    /// full response only travels in the detail.
    pub fn from_http_response(response: &HttpResponse) -> Self {
        let message = summarize_body(&response.body);
        let status = Self::new(Code::from_http_status(response.code), message);
        match postcard::to_allocvec(response) {
            Ok(encoded) => status.with_detail(HTTP_RESPONSE_TYPE_URL, encoded),
            // Vec-backed encoding of owned strings and bytes cannot fail; keep
            // the plain status if it ever does.
            Err(_) => status,
        }
    }

    /// Application error with a text body, e.g. `Status::errorf(404, "no such series")`.
    pub fn errorf(http_status: u16, message: impl Into<String>) -> Self {
        Self::from_http_response(&HttpResponse::text(http_status, message))
    }

    /// Recovers the response embedded by [`Status::from_http_response`].
    ///
    /// Returns `None` for plain RPC failures, and for details that do not
    /// decode: such a status is a transport failure, not an application one.
    pub fn http_response(&self) -> Option<HttpResponse> {
        let [detail] = self.details.as_slice() else {
            return None;
        };
        if detail.type_url != HTTP_RESPONSE_TYPE_URL {
            return None;
        }
        postcard::from_bytes(&detail.value).ok()
    }
}

fn summarize_body(body: &[u8]) -> String {
    if body.len() <= MAX_STATUS_MESSAGE_BYTES {
        return String::from_utf8_lossy(body).into_owned();
    }
    let mut message = String::from_utf8_lossy(&body[..MAX_STATUS_MESSAGE_BYTES]).into_owned();
    message.push_str("...");
    message
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error: code = {} desc = {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}
