use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub cookie_secure: bool,
    pub entity_cache_ttl: Duration,
    pub list_cache_ttl: Duration,
    pub adapter_timeout: Duration,
    pub object_store_root: PathBuf,
    pub object_store_public_url: String,
    pub search_url: String,
    pub search_index: String,
    pub search_rps: u32,
    pub oauth_state_ttl: Duration,
    pub email_code_ttl: Duration,
    pub email_sends_per_minute: u32,
    pub unverified_retention: Duration,
    pub sweep_interval: Duration,
    pub oauth: Vec<OAuthSettings>,
}

#[derive(Clone, Debug)]
pub struct OAuthSettings {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_url: String,
    pub scope: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = var_or("HOST", "0.0.0.0");
        let port: u16 = parse_or("PORT", 3000)?;

        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        anyhow::ensure!(!jwt_secret.trim().is_empty(), "JWT_SECRET must not be empty");

        let oauth = var_or("OAUTH_PROVIDERS", "")
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .map(|name| OAuthSettings::from_env(&name))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url: var_or("DATABASE_URL", "sqlite://film_catalog.db?mode=rwc"),
            jwt_secret,
            access_token_ttl: Duration::from_secs(parse_or("ACCESS_TOKEN_TTL_SECS", 900)?),
            refresh_token_ttl: Duration::from_secs(parse_or("REFRESH_TOKEN_TTL_SECS", 2_592_000)?),
            cookie_secure: parse_or("COOKIE_SECURE", true)?,
            entity_cache_ttl: Duration::from_secs(parse_or("ENTITY_CACHE_TTL_SECS", 3600)?),
            list_cache_ttl: Duration::from_secs(parse_or("LIST_CACHE_TTL_SECS", 300)?),
            adapter_timeout: Duration::from_millis(parse_or("ADAPTER_TIMEOUT_MS", 2000)?),
            object_store_root: PathBuf::from(var_or("OBJECT_STORE_ROOT", "./storage")),
            object_store_public_url: var_or(
                "OBJECT_STORE_PUBLIC_URL",
                "http://localhost:3000/static",
            ),
            search_url: var_or("SEARCH_URL", ""),
            search_index: var_or("SEARCH_INDEX", "films"),
            search_rps: parse_or("SEARCH_RPS", 20)?,
            oauth_state_ttl: Duration::from_secs(parse_or("OAUTH_STATE_TTL_SECS", 600)?),
            email_code_ttl: Duration::from_secs(parse_or("EMAIL_CODE_TTL_SECS", 900)?),
            email_sends_per_minute: parse_or("EMAIL_SENDS_PER_MINUTE", 1)?,
            unverified_retention: Duration::from_secs(
                parse_or::<u64>("UNVERIFIED_RETENTION_HOURS", 24)? * 3600,
            ),
            sweep_interval: Duration::from_secs(parse_or("SWEEP_INTERVAL_SECS", 86_400)?),
            oauth,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            access_token_ttl: Duration::from_secs(900),
            refresh_token_ttl: Duration::from_secs(3600),
            cookie_secure: false,
            entity_cache_ttl: Duration::from_secs(3600),
            list_cache_ttl: Duration::from_secs(300),
            adapter_timeout: Duration::from_millis(500),
            object_store_root: PathBuf::from("./storage"),
            object_store_public_url: "http://static.test".to_string(),
            search_url: String::new(),
            search_index: "films".to_string(),
            search_rps: 20,
            oauth_state_ttl: Duration::from_secs(600),
            email_code_ttl: Duration::from_secs(900),
            email_sends_per_minute: 1,
            unverified_retention: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(86_400),
            oauth: Vec::new(),
        }
    }
}

impl OAuthSettings {
    fn from_env(name: &str) -> anyhow::Result<Self> {
        let key = |suffix: &str| format!("OAUTH_{}_{suffix}", name.to_uppercase());
        let required = |suffix: &str| {
            let key = key(suffix);
            std::env::var(&key).with_context(|| format!("{key} must be set"))
        };

        Ok(Self {
            name: name.to_string(),
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            auth_url: required("AUTH_URL")?,
            token_url: required("TOKEN_URL")?,
            userinfo_url: required("USERINFO_URL")?,
            redirect_url: required("REDIRECT_URL")?,
            scope: std::env::var(key("SCOPE")).unwrap_or_else(|_| "email".to_string()),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().with_context(|| key.to_string()),
        _ => Ok(default),
    }
}
