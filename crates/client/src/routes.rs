//! Route table and navigation.
//!
//! Maps in-app locations to screens and runs the access guards for the
//! gated ones. Unknown locations go home.

use emporium_core::{Capability, ProductId};

use crate::guard::{self, GuardDecision};
use crate::session::AuthState;

/// The storefront home page.
pub const HOME: &str = "/";
/// The login page.
pub const LOGIN: &str = "/login";
/// The checkout page.
pub const CHECKOUT: &str = "/checkout";

/// Query parameter carrying the post-login destination.
const REDIRECT_PARAM: &str = "redirect";

/// A screen of the storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Product(ProductId),
    Login,
    Signup,
    Checkout,
    AdminAddProduct,
    AdminAddManager,
    AdminUsers,
    ManagerAddProduct,
    ManagerUsers,
}

impl Route {
    /// Match a location (path, optionally with query and fragment).
    #[must_use]
    pub fn parse(location: &str) -> Option<Self> {
        let path = split_path(location);
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };

        let route = match path {
            "/" | "" => Self::Home,
            "/login" => Self::Login,
            "/signup" => Self::Signup,
            "/checkout" => Self::Checkout,
            "/admin/add-product" => Self::AdminAddProduct,
            "/admin/add-manager" => Self::AdminAddManager,
            "/admin/users" => Self::AdminUsers,
            "/manager/add-product" => Self::ManagerAddProduct,
            "/manager/users" => Self::ManagerUsers,
            other => {
                let raw = other.strip_prefix("/product/")?;
                if raw.is_empty() || raw.contains('/') {
                    return None;
                }
                let id = urlencoding::decode(raw).ok()?;
                Self::Product(ProductId::new(id.into_owned()))
            }
        };
        Some(route)
    }

    /// Access requirement, or `None` for public screens.
    #[must_use]
    pub const fn requirement(&self) -> Option<Capability> {
        match self {
            Self::Home | Self::Product(_) | Self::Login | Self::Signup => None,
            Self::Checkout => Some(Capability::AuthenticatedOnly),
            Self::AdminAddProduct | Self::AdminAddManager | Self::AdminUsers => {
                Some(Capability::AdminOnly)
            }
            Self::ManagerAddProduct | Self::ManagerUsers => Some(Capability::ManagerOrAdmin),
        }
    }

    /// Canonical path of this screen.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Home => HOME.to_string(),
            Self::Product(id) => format!("/product/{}", urlencoding::encode(id.as_str())),
            Self::Login => LOGIN.to_string(),
            Self::Signup => "/signup".to_string(),
            Self::Checkout => CHECKOUT.to_string(),
            Self::AdminAddProduct => "/admin/add-product".to_string(),
            Self::AdminAddManager => "/admin/add-manager".to_string(),
            Self::AdminUsers => "/admin/users".to_string(),
            Self::ManagerAddProduct => "/manager/add-product".to_string(),
            Self::ManagerUsers => "/manager/users".to_string(),
        }
    }
}

/// What the UI should do for a navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// The session is still being restored; show nothing gated yet.
    Pending,
    /// Navigate elsewhere instead.
    Redirect(String),
    /// Show this screen.
    Render(Route),
}

/// Resolve `location` for the given session state.
#[must_use]
pub fn resolve(location: &str, state: &AuthState) -> Navigation {
    let Some(route) = Route::parse(location) else {
        return Navigation::Redirect(HOME.to_string());
    };
    let Some(capability) = route.requirement() else {
        return Navigation::Render(route);
    };
    if state.is_initializing() {
        return Navigation::Pending;
    }

    match guard::evaluate(state, capability, strip_fragment(location)) {
        GuardDecision::Allow => Navigation::Render(route),
        decision => Navigation::Redirect(decision.location().unwrap_or_else(|| HOME.to_string())),
    }
}

/// Login page location that returns to `return_to` afterwards.
#[must_use]
pub fn login_location(return_to: &str) -> String {
    format!(
        "{LOGIN}?{REDIRECT_PARAM}={}",
        urlencoding::encode(return_to)
    )
}

/// Where to go after a successful login from `login_page`.
///
/// Reads the `redirect` query parameter and accepts only local absolute
/// paths; anything else (missing, external, protocol-relative) goes home.
#[must_use]
pub fn post_login_target(login_page: &str) -> String {
    let query = strip_fragment(login_page)
        .split_once('?')
        .map_or("", |(_, query)| query);

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == REDIRECT_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|target| is_local_path(target))
        .unwrap_or_else(|| HOME.to_string())
}

/// Where "proceed to buy" leads.
#[must_use]
pub fn checkout_entry(state: &AuthState) -> String {
    if state.is_authenticated() {
        CHECKOUT.to_string()
    } else {
        login_location(CHECKOUT)
    }
}

fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}

fn strip_fragment(location: &str) -> &str {
    location.split_once('#').map_or(location, |(before, _)| before)
}

fn split_path(location: &str) -> &str {
    let location = strip_fragment(location);
    location.split_once('?').map_or(location, |(path, _)| path)
}
