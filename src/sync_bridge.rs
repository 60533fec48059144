use crate::error::AuthzError;
use crate::permission::{PermissionKind, RequestedTarget};
use crate::resolver::{DetailedPermissions, UserPermissions};
use crate::source::PrincipalSource;
use crate::{Authorizer, RightsChange};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;

pub fn block_on_authz<F, T>(rt: &Handle, f: F) -> T
where
    F: Future<Output = T>,
{
    match Handle::try_current() {
        Ok(_) => tokio::task::block_in_place(|| rt.block_on(f)),
        Err(_) => rt.block_on(f),
    }
}

/// Blocking facade over [`Authorizer`] for callers without an async context.
///
/// Calling it from inside a tokio runtime goes through `block_in_place`, which
/// panics on a current-thread runtime. Such callers need the multi-thread
/// runtime or should use the async [`Authorizer`] directly.
pub struct AuthorizerSync<S> {
    inner: Arc<Authorizer<S>>,
    rt: Handle,
}

impl<S: PrincipalSource> AuthorizerSync<S> {
    pub fn new(inner: Arc<Authorizer<S>>, rt: Handle) -> Self {
        Self { inner, rt }
    }

    pub fn inner(&self) -> &Arc<Authorizer<S>> {
        &self.inner
    }

    pub fn detailed_permissions(
        &self,
        principal_id: i64,
        target: &RequestedTarget,
    ) -> Result<Arc<DetailedPermissions>, AuthzError> {
        block_on_authz(
            &self.rt,
            self.inner.detailed_permissions(principal_id, target),
        )
    }

    pub fn user_permissions(&self, principal_id: i64) -> Result<UserPermissions, AuthzError> {
        block_on_authz(&self.rt, self.inner.user_permissions(principal_id))
    }

    pub fn check(
        &self,
        principal_id: i64,
        target: &RequestedTarget,
        kind: PermissionKind,
    ) -> Result<bool, AuthzError> {
        block_on_authz(&self.rt, self.inner.check(principal_id, target, kind))
    }

    pub fn apply_change(&self, change: RightsChange) -> Vec<i64> {
        self.inner.apply_change(change)
    }
}
