use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const URL_KEYS: &[&str] = &[
    "MAKAZI_BACKEND_URL",
    "SUPABASE_URL",
    "VITE_SUPABASE_URL",
    "NEXT_PUBLIC_SUPABASE_URL",
];
const ANON_KEY_KEYS: &[&str] = &[
    "MAKAZI_BACKEND_ANON_KEY",
    "SUPABASE_ANON_KEY",
    "VITE_SUPABASE_ANON_KEY",
    "NEXT_PUBLIC_SUPABASE_ANON_KEY",
];
const SERVICE_KEY_KEYS: &[&str] = &["SUPABASE_SERVICE_ROLE_KEY", "MAKAZI_SERVICE_ROLE_KEY"];
/// Prefixes that bundlers inline into browser code.
const PUBLIC_PREFIXES: &[&str] = &["VITE_", "NEXT_PUBLIC_"];

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub backend_anon_key: String,
    /// Server-held only; enables account deletion and verification lookups.
    pub service_role_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub store_path: PathBuf,
    pub site_url: String,
    pub profile_fetch_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let first_of = |keys: &[&str]| keys.iter().find_map(|key| get(*key));

        for key in SERVICE_KEY_KEYS {
            for prefix in PUBLIC_PREFIXES {
                let exposed = format!("{prefix}{key}");
                if get(&exposed).is_some() {
                    bail!("'{exposed}' would ship the service-role key to browsers; use '{key}'");
                }
            }
        }

        let backend_url = first_of(URL_KEYS).with_context(|| {
            format!("Backend URL is not set (tried {})", URL_KEYS.join(", "))
        })?;
        let backend_anon_key = first_of(ANON_KEY_KEYS).with_context(|| {
            format!("Backend anon key is not set (tried {})", ANON_KEY_KEYS.join(", "))
        })?;

        let timeout_secs = match get("PROFILE_FETCH_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("PROFILE_FETCH_TIMEOUT_SECS must be a whole number of seconds")?,
            None => 8,
        };

        Ok(Config {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            backend_anon_key,
            service_role_key: first_of(SERVICE_KEY_KEYS),
            port: get("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            store_path: get("MAKAZI_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".makazi/store.json")),
            site_url: get("MAKAZI_SITE_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string())
                .trim_end_matches('/')
                .to_string(),
            profile_fetch_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
