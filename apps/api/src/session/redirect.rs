use crate::models::profile::Profile;

pub const HOME: &str = "/";
pub const LOGIN: &str = "/login";
pub const DASHBOARD: &str = "/dashboard";
pub const ADMIN_DASHBOARD: &str = "/admin";

/// Post-authentication landing page. A missing profile (fetch failed or
/// timed out) lands on the standard dashboard.
pub fn role_destination(profile: Option<&Profile>) -> &'static str {
    match profile {
        Some(p) if p.is_admin => ADMIN_DASHBOARD,
        _ => DASHBOARD,
    }
}

/// Accepts only same-site relative paths, to keep `redirect` parameters
/// from sending users off-site.
pub fn safe_redirect(candidate: Option<&str>) -> Option<&str> {
    let path = candidate?.trim();
    let acceptable = path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.contains("://");
    acceptable.then_some(path)
}

/// `/login?redirect=<original path>`
pub fn login_with_return(original: &str) -> String {
    format!("{LOGIN}?redirect={}", urlencoding::encode(original))
}
