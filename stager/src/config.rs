use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StagerConfig {
    /// Base URL of the document server
    pub server_url: String,
    /// API route prefix on the server (joined as `{server_url}{api_route}`)
    pub api_route: String,
    /// Per-request timeout for the document endpoints
    pub request_timeout: Duration,
    /// Bounding-box edge of generated preview thumbnails, in pixels
    pub thumbnail_size: u32,
    /// Cooperative pause between consecutive thumbnail renders
    pub thumbnail_pause: Duration,
}

impl StagerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server_url: env_str("STAGER_SERVER_URL", "http://localhost:3000"),
            api_route: env_str("STAGER_API_ROUTE", "/api"),
            request_timeout: Duration::from_secs(env_parse("STAGER_REQUEST_TIMEOUT_SECS", 30)?),
            thumbnail_size: env_parse("STAGER_THUMBNAIL_SIZE", 256)?,
            thumbnail_pause: Duration::from_millis(env_parse("STAGER_THUMBNAIL_PAUSE_MS", 100)?),
        })
    }
}

impl Default for StagerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            api_route: "/api".to_string(),
            request_timeout: Duration::from_secs(30),
            thumbnail_size: 256,
            thumbnail_pause: Duration::from_millis(100),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}
