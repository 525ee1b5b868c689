//! HTTP Conversion Utilities
//!
//! Maps between `http` crate request/response types and the wire messages.
//!
//! # Architecture
//!
//! - Requests carry the path plus encoded query string as their `url`; the
//!   scheme and authority of an absolute URI are not transported.
//! - Headers are grouped by key, values for one key keep their order, keys are
//!   lowercase on both sides.
//! - Bodies are fully materialized [`Bytes`].
//!
//! # Example
//!
//! ```
//! use httpgrpc_common::transport::HttpTransport;
//! use hyper::body::Bytes;
//!
//! let request = http::Request::builder()
//!     .method("POST")
//!     .uri("/api/v1/push?sync=true")
//!     .header("X-Scope-OrgID", "team-a")
//!     .body(Bytes::from_static(b"payload"))
//!     .unwrap();
//!
//! let wire = HttpTransport::to_wire_request(request).unwrap();
//! assert_eq!(wire.url, "/api/v1/push?sync=true");
//! assert_eq!(wire.header("x-scope-orgid"), Some("team-a"));
//!
//! let rebuilt = HttpTransport::from_wire_request(wire).unwrap();
//! assert_eq!(rebuilt.uri().query(), Some("sync=true"));
//! ```

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode, Uri};
use hyper::body::Bytes;

use crate::protocol::error::{HttpgrpcError, Result};
use crate::protocol::requests::append_header;
use crate::protocol::{Header, HttpRequest, HttpResponse};

/// HTTP conversion functions
pub struct HttpTransport;

impl HttpTransport {
    /// Serializes a native request into a wire request.
    pub fn to_wire_request(request: Request<Bytes>) -> Result<HttpRequest> {
        let (parts, body) = request.into_parts();
        Ok(HttpRequest {
            method: parts.method.as_str().to_string(),
            url: path_and_query(&parts.uri),
            headers: Self::to_wire_headers(&parts.headers)?,
            body: body.to_vec(),
        })
    }

    /// Reconstructs a native request from a wire request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the method, url or a header does not parse.
    pub fn from_wire_request(request: HttpRequest) -> Result<Request<Bytes>> {
        let method = Method::from_bytes(request.method.as_bytes())?;
        let uri: Uri = if request.url.is_empty() {
            Uri::from_static("/")
        } else {
            request.url.parse()?
        };

        let mut native = Request::new(Bytes::from(request.body));
        *native.method_mut() = method;
        *native.uri_mut() = uri;
        Self::fill_headers(native.headers_mut(), &request.headers)?;
        Ok(native)
    }

    /// Serializes a native response into a wire response.
    pub fn to_wire_response(response: Response<Bytes>) -> Result<HttpResponse> {
        let (parts, body) = response.into_parts();
        Ok(HttpResponse {
            code: parts.status.as_u16(),
            headers: Self::to_wire_headers(&parts.headers)?,
            body: body.to_vec(),
        })
    }

    /// Reconstructs a native response from a wire response.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the status code is outside 100-999, and
    /// `InvalidRequest` if a header does not parse.
    pub fn from_wire_response(response: HttpResponse) -> Result<Response<Bytes>> {
        let status = StatusCode::from_u16(response.code).map_err(|_| {
            HttpgrpcError::InvalidResponse(format!("invalid status code {}", response.code))
        })?;

        let mut native = Response::new(Bytes::from(response.body));
        *native.status_mut() = status;
        Self::fill_headers(native.headers_mut(), &response.headers)?;
        Ok(native)
    }

    /// Groups a header map into wire headers.
    ///
    /// Values that are not visible ASCII are rejected rather than mangled.
    pub fn to_wire_headers(headers: &HeaderMap) -> Result<Vec<Header>> {
        let mut wire = Vec::with_capacity(headers.keys_len());
        for (name, value) in headers {
            let value = value.to_str().map_err(|_| {
                HttpgrpcError::InvalidRequest(format!("header '{}' is not valid text", name))
            })?;
            append_header(&mut wire, name.as_str(), value.to_string());
        }
        Ok(wire)
    }

    fn fill_headers(map: &mut HeaderMap, headers: &[Header]) -> Result<()> {
        for header in headers {
            let name = HeaderName::from_bytes(header.key.as_bytes())?;
            for value in &header.values {
                map.append(name.clone(), HeaderValue::from_str(value)?);
            }
        }
        Ok(())
    }
}

fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}
