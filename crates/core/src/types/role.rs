//! Roles, access tiers and capabilities.
//!
//! The server hands out free-form role tags (`ROLE_ADMIN`, `ROLE_MANAGER`,
//! `ROLE_USER`, ...). The client only cares about the ordered [`AccessTier`]
//! those tags grant, and every access decision goes through
//! [`Capability::is_satisfied_by`] rather than comparing tag strings.

use core::fmt;
use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Role tag carried by a user record.
///
/// Unknown tags are preserved verbatim so that a record survives a
/// persist/restore round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleTag {
    /// `ROLE_ADMIN`: full access to the admin console.
    Admin,
    /// `ROLE_MANAGER`: product and user moderation.
    Manager,
    /// Any other tag; grants nothing beyond plain authentication.
    Other(String),
}

impl RoleTag {
    /// Wire name of the admin role.
    pub const ADMIN: &'static str = "ROLE_ADMIN";
    /// Wire name of the manager role.
    pub const MANAGER: &'static str = "ROLE_MANAGER";

    /// The wire name of this tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => Self::ADMIN,
            Self::Manager => Self::MANAGER,
            Self::Other(name) => name,
        }
    }

    /// The access tier this tag grants on its own.
    #[must_use]
    pub const fn tier(&self) -> AccessTier {
        match self {
            Self::Admin => AccessTier::Admin,
            Self::Manager => AccessTier::Manager,
            Self::Other(_) => AccessTier::Authenticated,
        }
    }
}

impl From<&str> for RoleTag {
    fn from(name: &str) -> Self {
        match name {
            Self::ADMIN => Self::Admin,
            Self::MANAGER => Self::Manager,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RoleTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoleTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Login responses send bare strings; the user-management listing
        // sends role entities shaped like `{ "name": "ROLE_ADMIN" }`.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Entity { name: String },
        }

        let (Repr::Name(name) | Repr::Entity { name }) = Repr::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

/// Set of role tags held by a principal.
pub type RoleSet = BTreeSet<RoleTag>;

/// Ordered access level.
///
/// Ordering is the point: a higher tier satisfies every requirement of a
/// lower one, so admins pass manager gates without a special case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessTier {
    /// Signed in, no elevated role.
    Authenticated,
    /// Holds the manager role.
    Manager,
    /// Holds the admin role.
    Admin,
}

impl AccessTier {
    /// Highest tier granted by a set of roles.
    ///
    /// Every authenticated principal has at least [`AccessTier::Authenticated`].
    pub fn of<'a>(roles: impl IntoIterator<Item = &'a RoleTag>) -> Self {
        roles
            .into_iter()
            .map(RoleTag::tier)
            .max()
            .unwrap_or(Self::Authenticated)
    }
}

/// A named access requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Any signed-in principal.
    AuthenticatedOnly,
    /// Manager or admin.
    ManagerOrAdmin,
    /// Admin only.
    AdminOnly,
}

impl Capability {
    /// Minimum tier needed to satisfy this capability.
    #[must_use]
    pub const fn required_tier(self) -> AccessTier {
        match self {
            Self::AuthenticatedOnly => AccessTier::Authenticated,
            Self::ManagerOrAdmin => AccessTier::Manager,
            Self::AdminOnly => AccessTier::Admin,
        }
    }

    /// Whether an authenticated principal holding `roles` satisfies this
    /// capability.
    #[must_use]
    pub fn is_satisfied_by<'a>(self, roles: impl IntoIterator<Item = &'a RoleTag>) -> bool {
        AccessTier::of(roles) >= self.required_tier()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticatedOnly => write!(f, "authenticated"),
            Self::ManagerOrAdmin => write!(f, "manager or admin"),
            Self::AdminOnly => write!(f, "admin"),
        }
    }
}
