use crate::aggregate::{CapabilitySet, aggregate};
use crate::permission::{ObjectKind, PermissionKind, RequestedTarget};
use crate::role::{Principal, RoleClass};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: i64,
    pub role_names: Vec<String>,
}

/// Coarse, class-derived flags used for navigation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissions {
    pub is_system_admin: bool,
    pub is_database_admin: bool,
    pub is_database_viewer: bool,
    /// Always equal to `is_system_admin`; there is no user-management grant kind.
    pub has_user_management_access: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatabasePermissions {
    pub has_db_access: bool,
    pub has_db_read_access: bool,
    pub has_db_write_access: bool,
}

pub type GranularPermissions = CapabilitySet;

/// Everything a route loader needs to gate one screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetailedPermissions {
    pub current_user: CurrentUser,
    pub role_permissions: RolePermissions,
    pub database_permissions: DatabasePermissions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granular_permissions: Option<GranularPermissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_view: Option<String>,
}

impl DetailedPermissions {
    /// Gate check for an affordance. False when no schema was named.
    pub fn allows(&self, kind: PermissionKind) -> bool {
        self.granular_permissions
            .is_some_and(|granular| granular.allows(kind))
    }

    pub fn into_user_permissions(self) -> UserPermissions {
        UserPermissions {
            current_user: self.current_user,
            role_permissions: self.role_permissions,
            database_permissions: self.database_permissions,
        }
    }
}

/// Top-level navigation subset of [`DetailedPermissions`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserPermissions {
    pub current_user: CurrentUser,
    pub role_permissions: RolePermissions,
    pub database_permissions: DatabasePermissions,
}

pub fn role_permissions(principal: &Principal) -> RolePermissions {
    let is_system_admin = principal.has_class(RoleClass::SystemAdmin);
    RolePermissions {
        is_system_admin,
        is_database_admin: is_system_admin,
        is_database_viewer: principal.has_class(RoleClass::SystemViewer),
        has_user_management_access: is_system_admin,
    }
}

/// Counts every grant that covers `target` or sits at or below it, so any
/// grant at all yields `has_db_access` for the global target.
fn database_permissions(
    principal: &Principal,
    target: &RequestedTarget,
    is_system_admin: bool,
) -> DatabasePermissions {
    if is_system_admin {
        return DatabasePermissions {
            has_db_access: true,
            has_db_read_access: true,
            has_db_write_access: true,
        };
    }
    let mut access = DatabasePermissions::default();
    for grant in principal
        .grants()
        .filter(|grant| grant.scope.relevant_to(target))
    {
        access.has_db_access = true;
        if grant.kind.is_mutating() {
            access.has_db_write_access = true;
        } else {
            access.has_db_read_access = true;
        }
        if access.has_db_read_access && access.has_db_write_access {
            break;
        }
    }
    access
}

/// Resolves what `principal` may do with `target`. Never fails: missing grants
/// or roles just mean no access.
pub fn resolve(principal: &Principal, target: &RequestedTarget) -> DetailedPermissions {
    resolve_with_audit(principal, target, false)
}

pub(crate) fn resolve_with_audit(
    principal: &Principal,
    target: &RequestedTarget,
    audit_admin_override: bool,
) -> DetailedPermissions {
    let role_permissions = role_permissions(principal);
    let is_system_admin = role_permissions.is_system_admin;

    let granular_permissions = if target.is_global() {
        None
    } else if is_system_admin {
        if audit_admin_override {
            tracing::warn!(
                principal_id = principal.id,
                target = ?target,
                "system admin override used for granular permissions"
            );
        }
        Some(CapabilitySet::ALL)
    } else {
        Some(aggregate(principal.grants(), target))
    };

    let (target_table, target_view) = match target.object() {
        Some(object) if object.kind == ObjectKind::Table => (Some(object.name.clone()), None),
        Some(object) => (None, Some(object.name.clone())),
        None => (None, None),
    };

    DetailedPermissions {
        current_user: CurrentUser {
            id: principal.id,
            role_names: principal.role_names(),
        },
        role_permissions,
        database_permissions: database_permissions(principal, target, is_system_admin),
        granular_permissions,
        target_schema: target.schema_name().map(str::to_string),
        target_table,
        target_view,
    }
}

/// Navigation flags only, resolved against the global target.
pub fn resolve_user_permissions(principal: &Principal) -> UserPermissions {
    resolve(principal, &RequestedTarget::Global).into_user_permissions()
}
