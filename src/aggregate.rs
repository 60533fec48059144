use crate::permission::{PermissionGrant, PermissionKind, RequestedTarget};
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Read/write/create/delete outcome for one target.
///
/// Combines by field-wise OR: `Default` is the identity, and the operation is
/// associative, commutative and idempotent, so folding grants in any order or
/// any grouping gives the same answer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySet {
    pub can_read: bool,
    pub can_write: bool,
    pub can_create: bool,
    pub can_delete: bool,
}

impl CapabilitySet {
    pub const NONE: CapabilitySet = CapabilitySet {
        can_read: false,
        can_write: false,
        can_create: false,
        can_delete: false,
    };

    pub const ALL: CapabilitySet = CapabilitySet {
        can_read: true,
        can_write: true,
        can_create: true,
        can_delete: true,
    };

    pub fn of(kind: PermissionKind) -> Self {
        let mut caps = Self::NONE;
        caps.set(kind);
        caps
    }

    pub fn set(&mut self, kind: PermissionKind) {
        match kind {
            PermissionKind::Read => self.can_read = true,
            PermissionKind::Write => self.can_write = true,
            PermissionKind::Create => self.can_create = true,
            PermissionKind::Delete => self.can_delete = true,
        }
    }

    pub fn allows(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::Read => self.can_read,
            PermissionKind::Write => self.can_write,
            PermissionKind::Create => self.can_create,
            PermissionKind::Delete => self.can_delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    pub fn is_full(&self) -> bool {
        *self == Self::ALL
    }
}

impl BitOr for CapabilitySet {
    type Output = CapabilitySet;

    fn bitor(self, rhs: CapabilitySet) -> CapabilitySet {
        CapabilitySet {
            can_read: self.can_read || rhs.can_read,
            can_write: self.can_write || rhs.can_write,
            can_create: self.can_create || rhs.can_create,
            can_delete: self.can_delete || rhs.can_delete,
        }
    }
}

impl BitOrAssign for CapabilitySet {
    fn bitor_assign(&mut self, rhs: CapabilitySet) {
        *self = *self | rhs;
    }
}

impl FromIterator<PermissionKind> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = PermissionKind>>(iter: I) -> Self {
        iter.into_iter()
            .map(CapabilitySet::of)
            .fold(CapabilitySet::NONE, BitOr::bitor)
    }
}

impl FromIterator<CapabilitySet> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = CapabilitySet>>(iter: I) -> Self {
        iter.into_iter().fold(CapabilitySet::NONE, BitOr::bitor)
    }
}

/// Union of the kinds of every grant whose scope covers `target`.
pub fn aggregate<'a, I>(grants: I, target: &RequestedTarget) -> CapabilitySet
where
    I: IntoIterator<Item = &'a PermissionGrant>,
{
    let mut caps = CapabilitySet::NONE;
    for grant in grants {
        if caps.is_full() {
            break;
        }
        if grant.matches(target) {
            caps.set(grant.kind);
        }
    }
    caps
}

/// Aggregates the flattened grants of every role in one pass.
pub fn aggregate_roles(roles: &[Role], target: &RequestedTarget) -> CapabilitySet {
    aggregate(roles.iter().flat_map(Role::grants), target)
}

/// Same result as [`aggregate_roles`], computed per role and then combined.
pub fn aggregate_per_role(roles: &[Role], target: &RequestedTarget) -> CapabilitySet {
    roles
        .iter()
        .map(|role| aggregate(role.grants(), target))
        .collect()
}
