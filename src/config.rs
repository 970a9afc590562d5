use serde::Deserialize;

/// Used when `JWT_SECRET` is unset. Deployments must override it.
pub const DEFAULT_JWT_SECRET: &str = "DefaultSecretJwtKey";

/// Upper bound for `TOKEN_TTL_MINUTES` (one year).
pub const MAX_TTL_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub path: String,
}

/// Trust parameters for the message-broker caller and the activation topic.
#[derive(Debug, Clone, Deserialize)]
pub struct MsgQueueConfig {
    pub user_agent: String,
    pub allowed_urls: Vec<String>,
    pub url_check: bool,
    pub svc_url: String,
    pub pub_id: String,
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub route_version: Option<String>,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub msg_queue: MsgQueueConfig,
}

impl JwtConfig {
    pub fn ttl(&self) -> std::time::Duration {
        let minutes = self.ttl_minutes.clamp(0, MAX_TTL_MINUTES) as u64;
        std::time::Duration::from_secs(minutes * 60)
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = non_empty_var("DATABASE_URL");

        let secret = match non_empty_var("JWT_SECRET") {
            Some(s) => s,
            None => {
                tracing::warn!(
                    "JWT_SECRET is not set; falling back to the built-in default secret"
                );
                DEFAULT_JWT_SECRET.to_string()
            }
        };
        let jwt = JwtConfig {
            secret,
            ttl_minutes: parse_ttl(std::env::var("TOKEN_TTL_MINUTES").ok().as_deref())?,
        };

        let cookie = CookieConfig {
            path: std::env::var("COOKIE_PATH").unwrap_or_else(|_| "/".into()),
        };

        let msg_queue = MsgQueueConfig {
            user_agent: std::env::var("MSG_QUEUE_USER_AGENT")
                .unwrap_or_else(|_| "msgbroker".into()),
            allowed_urls: std::env::var("MSG_QUEUE_ALLOWED_URLS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            url_check: std::env::var("MSG_QUEUE_URL_CHECK")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(false),
            svc_url: std::env::var("MSG_QUEUE_SVC_URL")
                .unwrap_or_else(|_| "http://localhost:9090".into()),
            pub_id: std::env::var("MSG_QUEUE_PUB_ID").unwrap_or_else(|_| "user-management".into()),
            channel: std::env::var("MSG_QUEUE_CHANNEL").unwrap_or_else(|_| "new-user".into()),
        };

        Ok(Self {
            database_url,
            route_version: non_empty_var("SERVICE_ROUTE_VERSION"),
            jwt,
            cookie,
            msg_queue,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_ttl(raw: Option<&str>) -> anyhow::Result<i64> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(60);
    };
    let minutes: i64 = raw
        .parse()
        .map_err(|e| anyhow::anyhow!("TOKEN_TTL_MINUTES={raw}: {e}"))?;
    anyhow::ensure!(
        (1..=MAX_TTL_MINUTES).contains(&minutes),
        "TOKEN_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}, got {minutes}"
    );
    Ok(minutes)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
