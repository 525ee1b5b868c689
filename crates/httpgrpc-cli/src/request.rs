//! Building a wire request from command-line arguments.

use anyhow::Result;
use httpgrpc_common::HttpRequest;

/// Parses a `Key: value` header argument.
///
/// # Errors
///
/// Returns an error if there is no `:` or the key is empty.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid header '{}': expected 'Key: value'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Invalid header '{}': empty name", raw);
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Assembles the request `httpgrpc call` sends.
///
/// Paths without a leading `/` get one.
pub fn build_request(
    method: &str,
    path: &str,
    headers: &[String],
    body: Option<&str>,
) -> Result<HttpRequest> {
    let url = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let mut request = HttpRequest::new(method.to_ascii_uppercase(), url);
    for raw in headers {
        let (key, value) = parse_header(raw)?;
        request = request.with_header(&key, value);
    }
    if let Some(body) = body {
        request = request.with_body(body.as_bytes().to_vec());
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Content-Type: application/json").unwrap(),
            ("Content-Type".to_string(), "application/json".to_string())
        );
        assert_eq!(
            parse_header("X-Empty:").unwrap(),
            ("X-Empty".to_string(), String::new())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_build_request() {
        let request = build_request(
            "post",
            "api/v1/push",
            &["Content-Type: text/plain".to_string(), "X-A: 1".to_string(), "X-A: 2".to_string()],
            Some("hello"),
        )
        .unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "/api/v1/push");
        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.header_values("x-a"), ["1", "2"]);
        assert_eq!(request.body, b"hello");
    }

    #[test]
    fn test_build_request_rejects_bad_header() {
        assert!(build_request("GET", "/", &["broken".to_string()], None).is_err());
    }
}
