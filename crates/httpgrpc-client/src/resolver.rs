//! Address resolution
//!
//! Turns a configured address string into a transport target and the policy
//! used to find backends for it. No network I/O happens here.
//!
//! | Address                   | Target                   | Policy    |
//! |---------------------------|--------------------------|-----------|
//! | `direct://10.0.0.1:9095`  | `10.0.0.1:9095`          | direct    |
//! | `kubernetes://foo:123`    | `kubernetes://foo:123`   | discovery |
//! | `querier.cortex:995`      | `kubernetes://querier:995` | discovery |

use std::fmt;

use httpgrpc_common::{HttpgrpcError, Result};

pub const DIRECT_SCHEME: &str = "direct";
pub const KUBERNETES_SCHEME: &str = "kubernetes";

/// What a naming service needs to look a service up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryTarget {
    /// Service name, the host segment before the first `.`
    pub service: String,
    pub port: u16,
    /// Segment after the first `.`, when the address carried one
    pub namespace: Option<String>,
}

impl fmt::Display for DiscoveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}.{}:{}", self.service, namespace, self.port),
            None => write!(f, "{}:{}", self.service, self.port),
        }
    }
}

/// How the client locates backends for a resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// Dial the target itself, a single fixed endpoint.
    Direct,
    /// Keep a pool fed by a naming-service watch.
    Discovery(DiscoveryTarget),
}

impl Policy {
    pub fn is_direct(&self) -> bool {
        matches!(self, Policy::Direct)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Direct => f.write_str(DIRECT_SCHEME),
            Policy::Discovery(target) => write!(f, "{} ({})", KUBERNETES_SCHEME, target),
        }
    }
}

/// Parses a configured address into its transport target and policy.
///
/// # Errors
///
/// - `InvalidAddress` for a missing host or port, a non-numeric port, or an
///   empty remainder after a recognized scheme
/// - `UnsupportedScheme` for any scheme other than `direct` and `kubernetes`
///
/// # Example
///
/// ```
/// use httpgrpc_client::resolver::{parse_address, Policy};
///
/// let (target, policy) = parse_address("querier.cortex:995").unwrap();
/// assert_eq!(target, "kubernetes://querier:995");
/// assert!(matches!(policy, Policy::Discovery(_)));
/// ```
pub fn parse_address(address: &str) -> Result<(String, Policy)> {
    let Some((scheme, rest)) = address.split_once("://") else {
        let target = parse_host_port(address, address)?;
        let rewritten = format!("{}://{}:{}", KUBERNETES_SCHEME, target.service, target.port);
        return Ok((rewritten, Policy::Discovery(target)));
    };

    match scheme {
        DIRECT_SCHEME => {
            if rest.is_empty() {
                return Err(HttpgrpcError::invalid_address(address, "empty direct target"));
            }
            Ok((rest.to_string(), Policy::Direct))
        }
        KUBERNETES_SCHEME => {
            // `kubernetes:///svc:port` has an empty authority
            let target = parse_host_port(rest.trim_start_matches('/'), address)?;
            Ok((address.to_string(), Policy::Discovery(target)))
        }
        "" => Err(HttpgrpcError::invalid_address(address, "empty scheme")),
        other => Err(HttpgrpcError::UnsupportedScheme {
            scheme: other.to_string(),
            address: address.to_string(),
        }),
    }
}

fn parse_host_port(host_port: &str, address: &str) -> Result<DiscoveryTarget> {
    let Some((host, port)) = host_port.rsplit_once(':') else {
        return Err(HttpgrpcError::invalid_address(address, "missing port"));
    };
    if host.is_empty() {
        return Err(HttpgrpcError::invalid_address(address, "empty host"));
    }
    if port.is_empty() {
        return Err(HttpgrpcError::invalid_address(address, "empty port"));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| HttpgrpcError::invalid_address(address, format!("invalid port '{}'", port)))?;

    let mut segments = host.split('.');
    let service = segments.next().unwrap_or_default();
    if service.is_empty() {
        return Err(HttpgrpcError::invalid_address(address, "empty service name"));
    }
    let namespace = segments
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string);

    Ok(DiscoveryTarget {
        service: service.to_string(),
        port,
        namespace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let cases = [
            ("direct://foo", "foo", true),
            ("kubernetes://foo:123", "kubernetes://foo:123", false),
            ("querier.cortex:995", "kubernetes://querier:995", false),
        ];

        for (input, expected, direct) in cases {
            let (target, policy) = parse_address(input).unwrap();
            assert_eq!(target, expected, "target for {}", input);
            assert_eq!(policy.is_direct(), direct, "policy for {}", input);
        }
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = parse_address("ftp://x").unwrap_err();
        assert!(matches!(err, HttpgrpcError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_invalid_addresses() {
        for input in [
            "querier",
            ":995",
            "querier:",
            "querier:http",
            "querier:99999",
            ".cortex:995",
            "direct://",
            "kubernetes://foo",
            "kubernetes://:123",
            "://foo:1",
        ] {
            let err = parse_address(input).unwrap_err();
            assert!(
                matches!(err, HttpgrpcError::InvalidAddress { .. }),
                "{} gave {:?}",
                input,
                err
            );
        }
    }

    #[test]
    fn test_discovery_target_fields() {
        let (_, policy) = parse_address("querier.cortex:995").unwrap();
        assert_eq!(
            policy,
            Policy::Discovery(DiscoveryTarget {
                service: "querier".to_string(),
                port: 995,
                namespace: Some("cortex".to_string()),
            })
        );

        let (_, policy) = parse_address("kubernetes://foo:123").unwrap();
        let Policy::Discovery(target) = policy else {
            panic!("expected discovery");
        };
        assert_eq!(target.service, "foo");
        assert_eq!(target.namespace, None);
    }

    #[test]
    fn test_deep_qualifier_keeps_first_segment_only() {
        let (target, policy) = parse_address("distributor.cortex.svc.cluster.local:9095").unwrap();
        assert_eq!(target, "kubernetes://distributor:9095");
        let Policy::Discovery(discovery) = policy else {
            panic!("expected discovery");
        };
        assert_eq!(discovery.namespace.as_deref(), Some("cortex"));
        assert_eq!(discovery.to_string(), "distributor.cortex:9095");
    }

    #[test]
    fn test_direct_target_is_verbatim() {
        let (target, policy) = parse_address("direct://10.0.0.7:9095").unwrap();
        assert_eq!(target, "10.0.0.7:9095");
        assert_eq!(policy, Policy::Direct);
        assert_eq!(policy.to_string(), "direct");
    }

    #[test]
    fn test_kubernetes_empty_authority() {
        let (target, policy) = parse_address("kubernetes:///ingester.cortex:9095").unwrap();
        assert_eq!(target, "kubernetes:///ingester.cortex:9095");
        assert!(!policy.is_direct());
    }
}
