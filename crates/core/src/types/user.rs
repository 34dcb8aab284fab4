//! User records.

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;
use super::role::{AccessTier, Capability, RoleSet};

/// The signed-in principal, as returned by the auth service and persisted
/// alongside the session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: Email,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub roles: RoleSet,
}

impl UserRecord {
    /// Name to greet the user with: the username when set, else the email.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.email.as_str())
    }

    /// Highest access tier granted by this user's roles.
    #[must_use]
    pub fn tier(&self) -> AccessTier {
        AccessTier::of(&self.roles)
    }

    /// Whether this user satisfies `capability`.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        capability.is_satisfied_by(&self.roles)
    }
}

/// A user as listed by the management console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedUser {
    pub id: UserId,
    pub email: Email,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub roles: RoleSet,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::RoleTag;

    fn user(username: Option<&str>, roles: &[&str]) -> UserRecord {
        UserRecord {
            id: UserId::new("1"),
            email: Email::parse("shopper@example.com").unwrap(),
            username: username.map(str::to_owned),
            roles: roles.iter().map(|r| RoleTag::from(*r)).collect(),
        }
    }

    #[test]
    fn test_display_name_prefers_username() {
        assert_eq!(user(Some("sam"), &[]).display_name(), "sam");
        assert_eq!(user(None, &[]).display_name(), "shopper@example.com");
        assert_eq!(user(Some("  "), &[]).display_name(), "shopper@example.com");
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let record: UserRecord =
            serde_json::from_str(r#"{"id": 3, "email": "a@b.com"}"#).unwrap();
        assert_eq!(record.id.as_str(), "3");
        assert!(record.roles.is_empty());
        assert_eq!(record.tier(), AccessTier::Authenticated);
    }

    #[test]
    fn test_can() {
        let manager = user(None, &["ROLE_MANAGER"]);
        assert!(manager.can(Capability::ManagerOrAdmin));
        assert!(!manager.can(Capability::AdminOnly));
    }

    #[test]
    fn test_managed_user_with_role_entities() {
        let listed: ManagedUser = serde_json::from_str(
            r#"{"id": 9, "email": "m@b.com", "flagged": true, "roles": [{"name": "ROLE_MANAGER"}]}"#,
        )
        .unwrap();
        assert!(listed.flagged);
        assert!(listed.roles.contains(&RoleTag::Manager));
    }

    #[test]
    fn test_record_round_trip_is_stable() {
        let original = user(Some("sam"), &["ROLE_ADMIN", "ROLE_USER"]);
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(serde_json::from_str::<UserRecord>(&json).unwrap(), original);
    }
}
