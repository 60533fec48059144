use crate::error::AuthzError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for an [`Authorizer`](crate::Authorizer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopegateConfig {
    /// Upper bound on cached `(principal, target)` resolutions.
    pub cache_max_entries: usize,
    /// How long a cached resolution may be served. Zero disables caching.
    pub cache_ttl_ms: u64,
    /// Emit a `warn` event whenever a system admin bypasses granular checks.
    pub audit_admin_override: bool,
}

impl Default for ScopegateConfig {
    fn default() -> Self {
        Self {
            cache_max_entries: 1000,
            cache_ttl_ms: 30_000,
            audit_admin_override: true,
        }
    }
}

impl ScopegateConfig {
    pub fn production() -> Self {
        Self {
            cache_max_entries: 10_000,
            audit_admin_override: true,
            ..Self::default()
        }
    }

    pub fn development() -> Self {
        Self {
            cache_max_entries: 64,
            cache_ttl_ms: 1_000,
            audit_admin_override: false,
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, AuthzError> {
        let config: Self =
            serde_json::from_slice(bytes).map_err(|e| AuthzError::Decode(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_cache_max_entries(mut self, max_entries: usize) -> Self {
        self.cache_max_entries = max_entries;
        self
    }

    pub fn with_audit_admin_override(mut self, enabled: bool) -> Self {
        self.audit_admin_override = enabled;
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn caching_enabled(&self) -> bool {
        self.cache_ttl_ms > 0
    }

    pub fn validate(&self) -> Result<(), AuthzError> {
        if self.cache_max_entries == 0 {
            return Err(AuthzError::InvalidConfig {
                message: "cache_max_entries must be > 0".into(),
            });
        }
        Ok(())
    }
}
