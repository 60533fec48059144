use crate::error::{FieldError, GrantValidationError, ValidationErrors};
use crate::permission::{GrantRecord, PermissionGrant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reserved role name that marks a system administrator.
pub const ADMIN_ROLE_NAME: &str = "ADMIN";
/// Reserved role name that marks a database viewer.
pub const VIEWER_ROLE_NAME: &str = "VIEWER";

const MAX_ROLE_NAME_LEN: usize = 128;

/// Coarse designation of a role, independent of its grants.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleClass {
    #[default]
    Standard,
    SystemAdmin,
    SystemViewer,
}

impl RoleClass {
    /// Class for role data stored before the class was explicit: a
    /// case-insensitive match on the reserved names.
    pub fn from_legacy_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case(ADMIN_ROLE_NAME) {
            RoleClass::SystemAdmin
        } else if name.eq_ignore_ascii_case(VIEWER_ROLE_NAME) {
            RoleClass::SystemViewer
        } else {
            RoleClass::Standard
        }
    }
}

/// Wire form of a role. `roleClass` is optional for older payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_system_role: bool,
    #[serde(default)]
    pub role_class: Option<RoleClass>,
    #[serde(default, alias = "permissions")]
    pub grants: Vec<PermissionGrant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "RoleRecord", into = "RoleRecord")]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub class: RoleClass,
    grants: BTreeSet<PermissionGrant>,
}

impl From<RoleRecord> for Role {
    fn from(record: RoleRecord) -> Self {
        let class = record
            .role_class
            .unwrap_or_else(|| RoleClass::from_legacy_name(&record.name));
        Role {
            id: record.id,
            name: record.name,
            description: record.description,
            is_system_role: record.is_system_role,
            class,
            grants: record.grants.into_iter().collect(),
        }
    }
}

impl From<Role> for RoleRecord {
    fn from(role: Role) -> Self {
        RoleRecord {
            id: role.id,
            name: role.name,
            description: role.description,
            is_system_role: role.is_system_role,
            role_class: Some(role.class),
            grants: role.grants.into_iter().collect(),
        }
    }
}

impl Role {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            class: RoleClass::from_legacy_name(&name),
            name,
            description: None,
            is_system_role: false,
            grants: BTreeSet::new(),
        }
    }

    pub fn system(id: i64, name: impl Into<String>) -> Self {
        Self {
            is_system_role: true,
            ..Self::new(id, name)
        }
    }

    pub fn with_class(mut self, class: RoleClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder used for trusted, already-validated grants.
    pub fn with_grants(mut self, grants: impl IntoIterator<Item = PermissionGrant>) -> Self {
        self.grants.extend(grants);
        self
    }

    pub fn grants(&self) -> impl Iterator<Item = &PermissionGrant> {
        self.grants.iter()
    }

    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }

    pub fn holds(&self, grant: &PermissionGrant) -> bool {
        self.grants.contains(grant)
    }

    /// Adds a grant from the role editor. Malformed or duplicate grants are
    /// refused. A grant already implied by a broader grant of the same kind is
    /// accepted but logged.
    pub fn add_grant(&mut self, record: GrantRecord) -> Result<(), GrantValidationError> {
        let grant = PermissionGrant::try_from(record)?;
        if self.grants.contains(&grant) {
            return Err(GrantValidationError::Duplicate);
        }
        if let Some(broader) = self
            .grants
            .iter()
            .find(|g| g.kind == grant.kind && g.scope.contains(&grant.scope))
        {
            tracing::warn!(
                role_id = self.id,
                role_name = %self.name,
                new_grant = ?grant,
                existing_grant = ?broader,
                "adding grant already implied by a broader grant on this role"
            );
        }
        self.grants.insert(grant);
        Ok(())
    }

    pub fn remove_grant(&mut self, grant: &PermissionGrant) -> bool {
        self.grants.remove(grant)
    }
}

/// The acting user and every role assigned to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: i64,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(id: i64, roles: Vec<Role>) -> Self {
        Self { id, roles }
    }

    /// A principal the directory knows nothing about. Resolves to no access.
    pub fn unprivileged(id: i64) -> Self {
        Self {
            id,
            roles: Vec::new(),
        }
    }

    /// Every grant from every role, in role order. Duplicates are kept.
    pub fn grants(&self) -> impl Iterator<Item = &PermissionGrant> {
        self.roles.iter().flat_map(Role::grants)
    }

    pub fn has_class(&self, class: RoleClass) -> bool {
        self.roles.iter().any(|role| role.class == class)
    }

    pub fn role_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.roles.iter().map(|role| role.id)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|role| role.name.clone()).collect()
    }
}

/// Payload of the role create/edit form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "permissions")]
    pub grants: Vec<GrantRecord>,
}

impl RoleDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            grants: Vec::new(),
        }
    }

    pub fn grant(mut self, record: GrantRecord) -> Self {
        self.grants.push(record);
        self
    }

    /// Validates the draft, collecting every field error. `existing` is the
    /// stored role when editing; system roles keep their name and grants.
    pub fn validate(
        &self,
        existing: Option<&Role>,
    ) -> Result<Vec<PermissionGrant>, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push(FieldError::new("name", "required", "role name is required"));
        } else if name.len() > MAX_ROLE_NAME_LEN {
            errors.push(FieldError::new(
                "name",
                "too_long",
                format!("role name must be <= {MAX_ROLE_NAME_LEN} bytes"),
            ));
        }

        let mut accepted = BTreeSet::new();
        for (idx, record) in self.grants.iter().enumerate() {
            let prefix = format!("grants[{idx}]");
            match PermissionGrant::try_from(record.clone()) {
                Ok(grant) => {
                    if !accepted.insert(grant) {
                        errors.push(FieldError::from_grant(
                            &prefix,
                            &GrantValidationError::Duplicate,
                        ));
                    }
                }
                Err(err) => errors.push(FieldError::from_grant(&prefix, &err)),
            }
        }

        if let Some(role) = existing.filter(|role| role.is_system_role) {
            if name != role.name {
                errors.push(FieldError::new(
                    "name",
                    "system_role_immutable",
                    format!("system role '{}' cannot be renamed", role.name),
                ));
            }
            for protected in role.grants().filter(|g| !accepted.contains(*g)) {
                errors.push(FieldError::new(
                    "grants",
                    "protected_grant",
                    format!(
                        "system role '{}' must keep grant {} on {:?}",
                        role.name, protected.kind, protected.scope
                    ),
                ));
            }
        }

        errors.into_result()?;
        Ok(accepted.into_iter().collect())
    }

    /// Applies a validated draft, producing the role to submit.
    ///
    /// The name never decides the class here: an edited role keeps its stored
    /// class and a new role is `Standard`. Name-derived classes only apply to
    /// stored records written before `roleClass` existed.
    pub fn into_role(self, id: i64, existing: Option<&Role>) -> Result<Role, ValidationErrors> {
        let grants = self.validate(existing)?;
        let base = match existing {
            Some(role) => Role {
                name: self.name.trim().to_string(),
                description: self.description,
                grants: BTreeSet::new(),
                ..role.clone()
            },
            None => {
                let mut role = Role::new(id, self.name.trim()).with_class(RoleClass::Standard);
                role.description = self.description;
                role
            }
        };
        Ok(base.with_grants(grants))
    }
}
