pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
#[cfg(test)]
mod lib_tests;
pub mod permission;
pub mod resolver;
pub mod role;
pub mod source;
pub mod sync_bridge;

pub use crate::aggregate::{CapabilitySet, aggregate, aggregate_roles};
pub use crate::config::ScopegateConfig;
pub use crate::error::{AuthzError, FieldError, GrantValidationError, ValidationErrors};
pub use crate::permission::{
    GrantRecord, ObjectKind, ObjectRef, PermissionGrant, PermissionKind, RequestedTarget, Scope,
    TargetKey,
};
pub use crate::resolver::{
    DetailedPermissions, GranularPermissions, UserPermissions, resolve, resolve_user_permissions,
};
pub use crate::role::{Principal, Role, RoleClass, RoleDraft};
pub use crate::source::{PrincipalSource, StaticPrincipalSource};

use crate::cache::PermissionCache;
use crate::resolver::resolve_with_audit;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// A mutation that can change some principal's effective rights. Apply the
/// mutation to the principal source first, then report it here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RightsChange {
    RoleEdited { role_id: i64 },
    RoleDeleted { role_id: i64 },
    GrantAdded { role_id: i64 },
    GrantRemoved { role_id: i64 },
    RoleAssigned { principal_id: i64, role_id: i64 },
    RoleUnassigned { principal_id: i64, role_id: i64 },
    PrincipalRemoved { principal_id: i64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorizerMetrics {
    pub resolutions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct MetricCounters {
    resolutions: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    invalidations: AtomicU64,
}

/// Loads principal snapshots, resolves permissions and caches the results
/// per `(principal, schema, table, view)`.
pub struct Authorizer<S> {
    config: ScopegateConfig,
    source: S,
    cache: PermissionCache,
    metrics: MetricCounters,
}

impl<S: PrincipalSource> Authorizer<S> {
    pub fn new(config: ScopegateConfig, source: S) -> Result<Self, AuthzError> {
        config.validate()?;
        info!(
            cache_max_entries = config.cache_max_entries,
            cache_ttl_ms = config.cache_ttl_ms,
            "permission authorizer ready"
        );
        Ok(Self {
            cache: PermissionCache::new(config.cache_max_entries, config.cache_ttl()),
            config,
            source,
            metrics: MetricCounters::default(),
        })
    }

    pub fn config(&self) -> &ScopegateConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    /// Unknown principals come back without roles.
    pub async fn load_principal(&self, principal_id: i64) -> Result<Principal, AuthzError> {
        let principal = self.source.load_principal(principal_id).await?;
        Ok(principal.unwrap_or_else(|| {
            debug!(principal_id, "unknown principal resolves without roles");
            Principal::unprivileged(principal_id)
        }))
    }

    pub async fn detailed_permissions(
        &self,
        principal_id: i64,
        target: &RequestedTarget,
    ) -> Result<Arc<DetailedPermissions>, AuthzError> {
        let key = target.cache_key();
        if self.config.caching_enabled() {
            if let Some(hit) = self.cache.get(principal_id, &key, Instant::now()) {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
            self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let ticket = self.cache.ticket(principal_id);
        let principal = self.load_principal(principal_id).await?;
        let resolved = Arc::new(resolve_with_audit(
            &principal,
            target,
            self.config.audit_admin_override,
        ));
        self.metrics.resolutions.fetch_add(1, Ordering::Relaxed);

        if self.config.caching_enabled() {
            self.cache.put(
                ticket,
                key,
                principal.role_ids(),
                Arc::clone(&resolved),
                Instant::now(),
            );
        }
        Ok(resolved)
    }

    pub async fn user_permissions(&self, principal_id: i64) -> Result<UserPermissions, AuthzError> {
        let resolved = self
            .detailed_permissions(principal_id, &RequestedTarget::Global)
            .await?;
        Ok(DetailedPermissions::clone(&resolved).into_user_permissions())
    }

    /// Whether the UI may offer `kind` on `target`.
    pub async fn check(
        &self,
        principal_id: i64,
        target: &RequestedTarget,
        kind: PermissionKind,
    ) -> Result<bool, AuthzError> {
        Ok(self
            .detailed_permissions(principal_id, target)
            .await?
            .allows(kind))
    }

    /// The backend refused an action the local answer allowed. Its verdict
    /// wins: forget everything cached for the principal and ask again.
    pub async fn reresolve_after_rejection(
        &self,
        principal_id: i64,
        target: &RequestedTarget,
    ) -> Result<Arc<DetailedPermissions>, AuthzError> {
        info!(
            principal_id,
            target = ?target,
            "backend rejected a locally permitted action; re-resolving"
        );
        self.invalidate_principal(principal_id);
        self.detailed_permissions(principal_id, target).await
    }

    pub fn invalidate_principal(&self, principal_id: i64) {
        self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
        self.cache.invalidate_principal(principal_id);
    }

    /// Invalidates every principal the change can affect. Returns the
    /// principal ids whose cached entries were dropped.
    pub fn apply_change(&self, change: RightsChange) -> Vec<i64> {
        debug!(change = ?change, "applying rights change");
        match change {
            RightsChange::RoleEdited { role_id }
            | RightsChange::RoleDeleted { role_id }
            | RightsChange::GrantAdded { role_id }
            | RightsChange::GrantRemoved { role_id } => {
                self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
                self.cache.invalidate_role(role_id)
            }
            RightsChange::RoleAssigned { principal_id, .. }
            | RightsChange::RoleUnassigned { principal_id, .. }
            | RightsChange::PrincipalRemoved { principal_id } => {
                self.invalidate_principal(principal_id);
                vec![principal_id]
            }
        }
    }

    pub fn metrics(&self) -> AuthorizerMetrics {
        AuthorizerMetrics {
            resolutions: self.metrics.resolutions.load(Ordering::Relaxed),
            cache_hits: self.metrics.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.metrics.cache_misses.load(Ordering::Relaxed),
            invalidations: self.metrics.invalidations.load(Ordering::Relaxed),
        }
    }
}
