use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AutobotError, Result};
use crate::time::parse_zone;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_TIMEZONE: &str = "America/Vancouver";
pub const DEFAULT_SCOPE: &str = "repo";
pub const SESSION_COOKIE: &str = "autobot_session";
/// Upper bound for `delivery.timeout_secs`.
pub const MAX_DELIVERY_TIMEOUT_SECS: u64 = 600;

/// Top-level config (autobot.toml + AUTOBOT_* env overrides).
///
/// Nested keys use a double underscore in env vars, e.g.
/// `AUTOBOT_GITHUB__CLIENT_ID` → `github.client_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutobotConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub github: GithubConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally visible origin, used to build the OAuth redirect URI and
    /// to reconstruct the full callback URL behind a reverse proxy.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            public_url: default_public_url(),
        }
    }
}

/// The GitHub-compatible hosting service and the OAuth app registered on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Web origin commit URLs are expected under (e.g. `https://github.com`).
    #[serde(default = "default_github_base_url")]
    pub base_url: String,
    /// Prefix that replaces `base_url` in API calls (e.g. `https://api.github.com/repos`).
    #[serde(default = "default_github_api_root")]
    pub api_root: String,
    /// Defaults to `<base_url>/login/oauth/authorize`.
    pub authorize_url: Option<String>,
    /// Defaults to `<base_url>/login/oauth/access_token`.
    pub token_url: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl GithubConfig {
    pub fn authorize_url(&self) -> String {
        self.authorize_url
            .clone()
            .unwrap_or_else(|| format!("{}/login/oauth/authorize", self.base_url.trim_end_matches('/')))
    }

    pub fn token_url(&self) -> String {
        self.token_url
            .clone()
            .unwrap_or_else(|| format!("{}/login/oauth/access_token", self.base_url.trim_end_matches('/')))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie signing secret. When unset the gateway generates an ephemeral
    /// one at startup, which logs everybody out on restart.
    pub secret: Option<String>,
    #[serde(default = "default_session_ttl_hours")]
    pub ttl_hours: u32,
    /// Mark the session cookie `Secure` (HTTPS only).
    #[serde(default)]
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            ttl_hours: default_session_ttl_hours(),
            secure_cookie: false,
        }
    }
}

/// SQLite file holding both the job queue and browser sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of deliveries in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// IANA zone the schedule form's wall-clock times are interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_delivery_timeout_secs")]
    pub timeout_secs: u64,
    /// If set, every delivery outcome is POSTed here as JSON.
    pub notify_url: Option<String>,
    /// HMAC-SHA256 key for the `X-Autobot-Signature-256` header.
    pub notify_secret: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_delivery_timeout_secs(),
            notify_url: None,
            notify_secret: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_public_url() -> String {
    format!("http://localhost:{DEFAULT_PORT}")
}
fn default_github_base_url() -> String {
    "https://github.com".to_string()
}
fn default_github_api_root() -> String {
    "https://api.github.com/repos".to_string()
}
fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}
fn default_session_ttl_hours() -> u32 {
    24 * 7
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.autobot/autobot.db", home)
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_max_concurrency() -> usize {
    8
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_delivery_timeout_secs() -> u64 {
    30
}

impl AutobotConfig {
    /// Load config from an optional TOML file with AUTOBOT_* env var overrides,
    /// then validate it.
    ///
    /// A missing file is not an error; missing OAuth client credentials are.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let figment = match config_path {
            Some(path) => Figment::new().merge(Toml::file(path)),
            None => Figment::new().merge(Toml::file("autobot.toml")),
        };
        Self::from_figment(figment.merge(Env::prefixed("AUTOBOT_").split("__")))
    }

    /// Extract and validate from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AutobotConfig = figment
            .extract()
            .map_err(|e| AutobotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the gateway cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.github.client_id.trim().is_empty() {
            return Err(AutobotError::Config("github.client_id must not be empty".into()));
        }
        if self.github.client_secret.trim().is_empty() {
            return Err(AutobotError::Config("github.client_secret must not be empty".into()));
        }
        for (key, value) in [
            ("gateway.public_url", self.gateway.public_url.as_str()),
            ("github.base_url", self.github.base_url.as_str()),
            ("github.api_root", self.github.api_root.as_str()),
        ] {
            url::Url::parse(value)
                .map_err(|e| AutobotError::Config(format!("{key} is not a valid URL ({e}): {value}")))?;
        }
        if self.worker.max_concurrency == 0 {
            return Err(AutobotError::Config("worker.max_concurrency must be at least 1".into()));
        }
        if !(1..=MAX_DELIVERY_TIMEOUT_SECS).contains(&self.delivery.timeout_secs) {
            return Err(AutobotError::Config(format!(
                "delivery.timeout_secs must be between 1 and {MAX_DELIVERY_TIMEOUT_SECS}"
            )));
        }
        self.timezone()?;
        Ok(())
    }

    /// The schedule zone, parsed.
    pub fn timezone(&self) -> Result<Tz> {
        parse_zone(&self.schedule.timezone).map_err(|e| AutobotError::Config(e.to_string()))
    }

    /// OAuth redirect target: `<public_url>/callback`.
    pub fn redirect_url(&self) -> String {
        format!("{}/callback", self.gateway.public_url.trim_end_matches('/'))
    }
}
