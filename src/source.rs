use crate::error::AuthzError;
use crate::role::{Principal, Role};
use im::HashMap;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;

/// Supplies fully expanded principal snapshots (roles with their grants).
///
/// `Ok(None)` means the principal is unknown; callers treat that as a
/// principal without roles rather than an error.
pub trait PrincipalSource: Send + Sync {
    fn load_principal(
        &self,
        principal_id: i64,
    ) -> impl Future<Output = Result<Option<Principal>, AuthzError>> + Send;
}

impl<S: PrincipalSource> PrincipalSource for Arc<S> {
    fn load_principal(
        &self,
        principal_id: i64,
    ) -> impl Future<Output = Result<Option<Principal>, AuthzError>> + Send {
        self.as_ref().load_principal(principal_id)
    }
}

/// In-memory principal directory. Reads work on a cheap persistent snapshot.
#[derive(Debug, Default)]
pub struct StaticPrincipalSource {
    principals: RwLock<HashMap<i64, Principal>>,
}

impl StaticPrincipalSource {
    pub fn new(principals: impl IntoIterator<Item = Principal>) -> Self {
        Self {
            principals: RwLock::new(principals.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    /// Loads a JSON array of principal snapshots.
    pub fn from_json(bytes: &[u8]) -> Result<Self, AuthzError> {
        let principals: Vec<Principal> =
            serde_json::from_slice(bytes).map_err(|e| AuthzError::Decode(e.to_string()))?;
        Ok(Self::new(principals))
    }

    pub fn snapshot(&self) -> HashMap<i64, Principal> {
        self.principals.read().clone()
    }

    pub fn upsert_principal(&self, principal: Principal) {
        self.principals.write().insert(principal.id, principal);
    }

    pub fn remove_principal(&self, principal_id: i64) -> Option<Principal> {
        self.principals.write().remove(&principal_id)
    }

    /// Replaces `role` wherever it is assigned. Returns the principals that
    /// held it.
    pub fn update_role(&self, role: &Role) -> Vec<i64> {
        let mut principals = self.principals.write();
        let holders: Vec<i64> = principals
            .values()
            .filter(|p| p.roles.iter().any(|r| r.id == role.id))
            .map(|p| p.id)
            .collect();
        for id in &holders {
            if let Some(principal) = principals.get_mut(id) {
                for assigned in principal.roles.iter_mut().filter(|r| r.id == role.id) {
                    *assigned = role.clone();
                }
            }
        }
        holders
    }
}

impl PrincipalSource for StaticPrincipalSource {
    fn load_principal(
        &self,
        principal_id: i64,
    ) -> impl Future<Output = Result<Option<Principal>, AuthzError>> + Send {
        let principal = self.principals.read().get(&principal_id).cloned();
        std::future::ready(Ok(principal))
    }
}
