use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{HttpgrpcError, Result};

/// Header that carries the tenant (org) identifier end to end.
pub const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Opaque tenant identifier used for multi-tenant routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Rejects empty identifiers; anything else is opaque to the bridge.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(HttpgrpcError::InvalidRequest(
                "tenant id must not be empty".to_string(),
            ));
        }
        Ok(TenantId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TenantId {
    type Err = HttpgrpcError;

    fn from_str(s: &str) -> Result<Self> {
        TenantId::new(s)
    }
}
