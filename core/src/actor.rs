//! Resolved caller identity.
//!
//! Authentication and role resolution are external; the core trusts the
//! `(user id, role)` pair it is handed.

use crate::ids::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform role of the caller
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Buyer; owns orders and return requests
    Customer,
    /// Seller; owns order items and payouts
    Vendor,
    /// Pickup point operator; confirms physical handovers
    Agent,
    /// Platform administrator
    Admin,
}

impl Role {
    /// Lowercase role name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Vendor => "vendor",
            Self::Agent => "agent",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller of an operation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Authenticated user
    pub user_id: UserId,
    /// Resolved role
    pub role: Role,
}

impl Actor {
    /// Creates an actor
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Customer actor
    #[must_use]
    pub const fn customer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Customer)
    }

    /// Vendor actor
    #[must_use]
    pub const fn vendor(user_id: UserId) -> Self {
        Self::new(user_id, Role::Vendor)
    }

    /// Agent actor
    #[must_use]
    pub const fn agent(user_id: UserId) -> Self {
        Self::new(user_id, Role::Agent)
    }

    /// Admin actor
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    /// Whether the actor is an administrator
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Whether the actor is the given user acting in the given role
    #[must_use]
    pub fn is(&self, role: Role, user_id: UserId) -> bool {
        self.role == role && self.user_id == user_id
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.user_id)
    }
}
