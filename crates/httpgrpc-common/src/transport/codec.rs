use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::protocol::error::Result;
use crate::protocol::{ClientFrame, RequestId, RpcResponse};

/// Codec for encoding/decoding RPC frames
///
/// Both ends of a connection must be configured with the same codec; there is
/// no negotiation on the wire.
///
/// # Example
///
/// ```
/// use httpgrpc_common::transport::Codec;
/// use httpgrpc_common::protocol::{ClientFrame, HttpRequest, RpcRequest};
///
/// let codec = Codec::default();
/// let frame = ClientFrame::Call(RpcRequest::new(HttpRequest::new("GET", "/hello")));
///
/// let encoded = codec.encode_frame(&frame).unwrap();
/// let decoded = codec.decode_frame(&encoded).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    /// Compact binary encoding (default)
    #[default]
    Postcard,
    /// JSON, handy when inspecting traffic
    Json,
}

impl Codec {
    /// Encode a client frame to bytes
    pub fn encode_frame(&self, frame: &ClientFrame) -> Result<Vec<u8>> {
        self.encode(frame)
    }

    /// Decode a client frame from bytes
    pub fn decode_frame(&self, data: &[u8]) -> Result<ClientFrame> {
        self.decode(data)
    }

    /// Encode a response frame to bytes
    pub fn encode_response(&self, response: &RpcResponse) -> Result<Vec<u8>> {
        self.encode(response)
    }

    /// Decode a response frame from bytes
    pub fn decode_response(&self, data: &[u8]) -> Result<RpcResponse> {
        self.decode(data)
    }

    /// Request id of a client frame, read from its first bytes only.
    ///
    /// Used to fail a call whose frame was too large to decode.
    pub fn peek_frame_id(&self, head: &[u8]) -> Option<RequestId> {
        match self {
            // Variant index, then the id as the first field of either variant
            Codec::Postcard => postcard::take_from_bytes::<(u32, RequestId)>(head)
                .ok()
                .map(|((_, id), _)| id),
            Codec::Json => leading_json_id(head),
        }
    }

    /// Request id of a response frame, read from its first bytes only.
    pub fn peek_response_id(&self, head: &[u8]) -> Option<RequestId> {
        match self {
            Codec::Postcard => postcard::take_from_bytes::<RequestId>(head)
                .ok()
                .map(|(id, _)| id),
            Codec::Json => leading_json_id(head),
        }
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Postcard => Ok(postcard::to_allocvec(value)?),
            Codec::Json => Ok(serde_json::to_vec(value)?),
        }
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Codec::Postcard => Ok(postcard::from_bytes(data)?),
            Codec::Json => Ok(serde_json::from_slice(data)?),
        }
    }
}

fn leading_json_id(head: &[u8]) -> Option<RequestId> {
    const KEY: &[u8] = b"\"id\":";
    let start = head.windows(KEY.len()).position(|w| w == KEY)? + KEY.len();
    let digits = head[start..].split(|b| !b.is_ascii_digit()).next()?;
    // A number cut off by the end of the head is not trustworthy
    if digits.is_empty() || start + digits.len() >= head.len() {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

impl std::str::FromStr for Codec {
    type Err = crate::protocol::HttpgrpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postcard" => Ok(Codec::Postcard),
            "json" => Ok(Codec::Json),
            other => Err(crate::protocol::HttpgrpcError::InvalidRequest(format!(
                "unknown codec '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HttpRequest, HttpResponse, RpcRequest, Status};

    fn sample_call() -> ClientFrame {
        ClientFrame::Call(
            RpcRequest::new(
                HttpRequest::new("POST", "/api/prom/push?x=1")
                    .with_header("Content-Type", "application/x-protobuf")
                    .with_header("X-Scope-OrgID", "1")
                    .with_body(vec![0u8, 1, 2, 255]),
            )
            .with_timeout(5000),
        )
    }

    #[test]
    fn test_postcard_frames() {
        let codec = Codec::Postcard;
        let frame = sample_call();
        let decoded = codec.decode_frame(&codec.encode_frame(&frame).unwrap()).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_json_frames() {
        let codec = Codec::Json;
        let frame = ClientFrame::Cancel { id: 42 };
        let encoded = codec.encode_frame(&frame).unwrap();
        assert!(String::from_utf8(encoded.clone()).unwrap().contains("Cancel"));
        assert_eq!(codec.decode_frame(&encoded).unwrap(), frame);
    }

    #[test]
    fn test_failure_response_keeps_details() {
        let codec = Codec::default();
        let response = RpcResponse::failure(9, Status::errorf(503, "overloaded"));
        let decoded = codec
            .decode_response(&codec.encode_response(&response).unwrap())
            .unwrap();

        let status = decoded.outcome.unwrap_err();
        assert_eq!(status.http_response(), Some(HttpResponse::text(503, "overloaded")));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Codec::Postcard.decode_response(&[0xff, 0xff, 0xff]).is_err());
        assert!(Codec::Json.decode_frame(b"{not json").is_err());
    }

    #[test]
    fn test_peek_ids_from_frame_heads() {
        let head_of = |bytes: Vec<u8>| bytes[..bytes.len().min(64)].to_vec();
        let frame = sample_call();
        let response = RpcResponse::success(
            u64::MAX - 3,
            HttpResponse::new(200).with_body(vec![b'x'; 500]),
        );

        for codec in [Codec::Postcard, Codec::Json] {
            let head = head_of(codec.encode_frame(&frame).unwrap());
            assert_eq!(codec.peek_frame_id(&head), Some(frame.id()), "{:?}", codec);

            let head = head_of(codec.encode_response(&response).unwrap());
            assert_eq!(codec.peek_response_id(&head), Some(u64::MAX - 3), "{:?}", codec);
        }

        assert_eq!(Codec::Json.peek_frame_id(b"{\"Call\":{\"id\":12"), None);
        assert_eq!(Codec::Postcard.peek_response_id(&[]), None);
    }

    #[test]
    fn test_codec_from_str() {
        assert_eq!("postcard".parse::<Codec>().unwrap(), Codec::Postcard);
        assert_eq!("JSON".parse::<Codec>().unwrap(), Codec::Json);
        assert!("msgpack".parse::<Codec>().is_err());
    }
}
