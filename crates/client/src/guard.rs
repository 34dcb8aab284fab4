//! Access guards.
//!
//! Synchronous checks run on route entry, before any gated content is
//! built. Signed-out users are sent to the login page with the original
//! target as the `redirect` parameter, whatever the requirement. Signed-in
//! users without the required tier are sent home.

use emporium_core::{Capability, RoleTag};

use crate::routes::{HOME, login_location};
use crate::session::AuthState;

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the gated content.
    Allow,
    /// Sign in first, then come back to `return_to`.
    RedirectToLogin {
        /// Path and query of the original target.
        return_to: String,
    },
    /// Signed in but not allowed here.
    RedirectHome,
}

impl GuardDecision {
    /// Where to navigate instead, or `None` to render.
    #[must_use]
    pub fn location(&self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::RedirectToLogin { return_to } => Some(login_location(return_to)),
            Self::RedirectHome => Some(HOME.to_string()),
        }
    }

    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decide whether a principal may enter `target`.
///
/// `target` is the path and query being navigated to.
#[must_use]
pub fn decide<'a>(
    is_authenticated: bool,
    roles: impl IntoIterator<Item = &'a RoleTag>,
    capability: Capability,
    target: &str,
) -> GuardDecision {
    if !is_authenticated {
        return GuardDecision::RedirectToLogin {
            return_to: target.to_string(),
        };
    }
    if capability.is_satisfied_by(roles) {
        GuardDecision::Allow
    } else {
        GuardDecision::RedirectHome
    }
}

/// [`decide`] against the current session state.
#[must_use]
pub fn evaluate(state: &AuthState, capability: Capability, target: &str) -> GuardDecision {
    let roles = state.user().map(|u| &u.roles);
    decide(
        state.is_authenticated(),
        roles.into_iter().flatten(),
        capability,
        target,
    )
}
