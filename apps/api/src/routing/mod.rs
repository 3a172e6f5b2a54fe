//! Page table and route guard.
//!
//! The view layer asks `guard` what to do with a path before rendering it.
//! The answer depends only on the path and the current auth snapshot.

pub mod handlers;

use serde::Serialize;

use crate::session::redirect::{login_with_return, safe_redirect, DASHBOARD};
use crate::session::{AuthSnapshot, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    /// Login/sign-up pages; signed-in users are sent on to their dashboard.
    GuestOnly,
    Authenticated,
    Admin,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub pattern: &'static str,
    pub name: &'static str,
    pub access: Access,
}

pub const PAGES: &[Page] = &[
    Page { pattern: "/", name: "home", access: Access::Public },
    Page { pattern: "/about", name: "about", access: Access::Public },
    Page { pattern: "/contact", name: "contact", access: Access::Public },
    Page { pattern: "/pricing", name: "pricing", access: Access::Public },
    Page { pattern: "/listings", name: "listings", access: Access::Public },
    Page { pattern: "/listings/:id", name: "listing_detail", access: Access::Public },
    Page { pattern: "/login", name: "login", access: Access::GuestOnly },
    Page { pattern: "/signup", name: "signup", access: Access::GuestOnly },
    Page { pattern: "/forgot-password", name: "forgot_password", access: Access::GuestOnly },
    Page { pattern: "/reset-password", name: "reset_password", access: Access::Public },
    Page { pattern: "/dashboard", name: "dashboard", access: Access::Authenticated },
    Page { pattern: "/post-rental", name: "post_rental", access: Access::Authenticated },
    Page { pattern: "/pay-rent", name: "pay_rent", access: Access::Authenticated },
    Page { pattern: "/applications", name: "applications", access: Access::Authenticated },
    Page { pattern: "/profile", name: "profile", access: Access::Authenticated },
    Page { pattern: "/calendar", name: "calendar", access: Access::Authenticated },
    Page { pattern: "/admin", name: "admin_dashboard", access: Access::Admin },
    Page { pattern: "/admin/users", name: "admin_users", access: Access::Admin },
    Page { pattern: "/admin/quotes", name: "admin_quotes", access: Access::Admin },
    Page { pattern: "/admin/tiers", name: "admin_tiers", access: Access::Admin },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// Auth state is still being restored; show a spinner.
    Loading,
    Render { page: &'static str },
    Redirect { to: String },
    NotFound,
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    let mut pattern_parts = pattern.trim_end_matches('/').split('/');
    let mut path_parts = path.trim_end_matches('/').split('/');
    loop {
        match (pattern_parts.next(), path_parts.next()) {
            (None, None) => return true,
            (Some(p), Some(s)) if p.starts_with(':') && !s.is_empty() => continue,
            (Some(p), Some(s)) if p == s => continue,
            _ => return false,
        }
    }
}

/// Looks up the page for a path (query string and fragment ignored).
pub fn resolve(path: &str) -> Option<&'static Page> {
    let bare = path.split(['?', '#']).next().unwrap_or_default();
    PAGES.iter().find(|page| matches_pattern(page.pattern, bare))
}

fn query_param(path: &str, key: &str) -> Option<String> {
    let (_, query) = path.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| urlencoding::decode(v).ok())
        .map(|v| v.into_owned())
}

pub fn guard(path: &str, auth: &AuthSnapshot) -> Decision {
    let Some(page) = resolve(path) else {
        return Decision::NotFound;
    };

    match page.access {
        Access::Public => Decision::Render { page: page.name },
        _ if auth.phase == Phase::Loading => Decision::Loading,
        Access::GuestOnly if auth.is_authenticated() => {
            let requested = query_param(path, "redirect");
            let to = safe_redirect(requested.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| auth.destination().to_string());
            Decision::Redirect { to }
        }
        Access::GuestOnly => Decision::Render { page: page.name },
        _ if !auth.is_authenticated() => Decision::Redirect {
            to: login_with_return(path),
        },
        Access::Admin if !auth.is_admin() => Decision::Redirect {
            to: DASHBOARD.to_string(),
        },
        Access::Authenticated | Access::Admin => Decision::Render { page: page.name },
    }
}
