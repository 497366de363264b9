//! # Role Gate
//!
//! Capability-based authorization for every mutating vault entry point.
//!
//! There are exactly three capabilities:
//!
//! | Role      | May                                                        |
//! |-----------|------------------------------------------------------------|
//! | `Admin`   | grant and revoke `Manager` / `Agent`, sweep residual value |
//! | `Manager` | configure assets, add and remove strategies                |
//! | `Agent`   | route token deposits, execute / harvest / exit strategies  |
//!
//! Grants live in a single table keyed by `(role, principal)`. Callers check
//! it explicitly with [`RoleGate::require`] at the top of each operation;
//! nothing is inherited and nothing is implied. A failed check is always a
//! hard [`AccessError::Unauthorized`], never a silent no-op.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::types::Address;

/// Errors raised by the role gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The principal lacks the capability the operation needs.
    #[error("unauthorized: {principal} lacks the {role} role")]
    Unauthorized {
        /// Who tried.
        principal: Address,
        /// What they needed.
        role: Role,
    },

    /// Admin membership is fixed at vault creation.
    #[error("the admin role cannot be granted or revoked")]
    AdminRoleNotGrantable,

    /// Roles cannot be granted to the null address.
    #[error("invalid address: roles cannot be granted to the null address")]
    InvalidAddress,
}

/// A vault capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Manager,
    Agent,
}

impl Role {
    /// Single-byte tag used as the storage key prefix.
    pub fn tag(&self) -> u8 {
        match self {
            Role::Admin => 0,
            Role::Manager => 1,
            Role::Agent => 2,
        }
    }

    /// Inverse of [`Role::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Role::Admin),
            1 => Some(Role::Manager),
            2 => Some(Role::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Manager => write!(f, "manager"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// The authorization table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGate {
    grants: BTreeSet<(Role, Address)>,
}

impl RoleGate {
    /// Creates a gate whose only grant is `admin` holding [`Role::Admin`].
    pub fn new(admin: Address) -> Result<Self, AccessError> {
        if admin.is_zero() {
            return Err(AccessError::InvalidAddress);
        }
        let mut grants = BTreeSet::new();
        grants.insert((Role::Admin, admin));
        Ok(Self { grants })
    }

    /// Rebuilds a gate from persisted grants.
    pub fn from_grants<I: IntoIterator<Item = (Role, Address)>>(grants: I) -> Self {
        Self {
            grants: grants.into_iter().collect(),
        }
    }

    /// Returns `true` if `principal` holds `role`.
    pub fn has_role(&self, principal: &Address, role: Role) -> bool {
        self.grants.contains(&(role, *principal))
    }

    /// Fails with [`AccessError::Unauthorized`] unless `principal` holds `role`.
    pub fn require(&self, principal: &Address, role: Role) -> Result<(), AccessError> {
        if self.has_role(principal, role) {
            Ok(())
        } else {
            Err(AccessError::Unauthorized {
                principal: *principal,
                role,
            })
        }
    }

    /// Grants `role` to `account`. Admin-only; the admin role itself is not
    /// grantable. Returns `false` if the grant already existed.
    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<bool, AccessError> {
        self.require(caller, Role::Admin)?;
        if role == Role::Admin {
            return Err(AccessError::AdminRoleNotGrantable);
        }
        if account.is_zero() {
            return Err(AccessError::InvalidAddress);
        }
        Ok(self.grants.insert((role, account)))
    }

    /// Revokes `role` from `account`. Admin-only. Returns `false` if there
    /// was nothing to revoke.
    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: &Address,
    ) -> Result<bool, AccessError> {
        self.require(caller, Role::Admin)?;
        if role == Role::Admin {
            return Err(AccessError::AdminRoleNotGrantable);
        }
        Ok(self.grants.remove(&(role, *account)))
    }

    /// Drops one of the caller's own roles, admin included.
    pub fn renounce_role(&mut self, caller: &Address, role: Role) -> Result<(), AccessError> {
        self.require(caller, role)?;
        self.grants.remove(&(role, *caller));
        Ok(())
    }

    /// All holders of `role`, in address order.
    pub fn members(&self, role: Role) -> Vec<Address> {
        self.grants
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, a)| *a)
            .collect()
    }

    /// Every `(role, principal)` pair.
    pub fn grants(&self) -> impl Iterator<Item = &(Role, Address)> {
        self.grants.iter()
    }
}
