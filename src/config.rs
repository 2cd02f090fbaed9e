use std::env;
use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use governor::Quota;

#[derive(Clone)]
pub struct Config {
    // Admin listener
    pub bind_address: String,
    pub port: u16,
    pub admin_api_key: Option<String>,
    pub admin_period_secs: u64,
    pub admin_burst_limit: u32,

    // Upstream APIs
    pub battlemetrics_url: String,
    pub discord_api_url: String,
    pub discord_token: String,

    // Persistence
    pub state_path: PathBuf,

    // Pacing
    pub fetch_timeout_secs: u64,
    pub pacing_delay_ms: u64,
    pub startup_grace_secs: u64,
    pub ready_retry_secs: u64,

    // Search command
    pub search_game: String,
    pub search_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            admin_api_key: None,
            admin_period_secs: 1,
            admin_burst_limit: 20,
            battlemetrics_url: "https://api.battlemetrics.com".to_string(),
            discord_api_url: "https://discord.com/api/v10".to_string(),
            discord_token: String::new(),
            state_path: PathBuf::from("bmsync-state.json"),
            fetch_timeout_secs: 30,
            pacing_delay_ms: 2000, // Discord rename budget is tight
            startup_grace_secs: 10,
            ready_retry_secs: 5,
            search_game: "squad".to_string(),
            search_page_size: 10,
        }
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("admin_api_key", &self.admin_api_key.as_deref().map(redacted))
            .field("admin_period_secs", &self.admin_period_secs)
            .field("admin_burst_limit", &self.admin_burst_limit)
            .field("battlemetrics_url", &self.battlemetrics_url)
            .field("discord_api_url", &self.discord_api_url)
            .field("discord_token", &redacted(&self.discord_token))
            .field("state_path", &self.state_path)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("pacing_delay_ms", &self.pacing_delay_ms)
            .field("startup_grace_secs", &self.startup_grace_secs)
            .field("ready_retry_secs", &self.ready_retry_secs)
            .field("search_game", &self.search_game)
            .field("search_page_size", &self.search_page_size)
            .finish()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind_address: env_or("BIND_ADDRESS", d.bind_address),
            port: env_or("PORT", d.port),
            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty()),
            admin_period_secs: env_or("ADMIN_PERIOD_SECS", d.admin_period_secs),
            admin_burst_limit: env_or("ADMIN_BURST_LIMIT", d.admin_burst_limit),

            battlemetrics_url: env_or("BATTLEMETRICS_API_URL", d.battlemetrics_url),
            discord_api_url: env_or("DISCORD_API_URL", d.discord_api_url),
            discord_token: env_or("DISCORD_BOT_TOKEN", d.discord_token),

            state_path: env_or("STATE_FILE", d.state_path),

            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", d.fetch_timeout_secs),
            pacing_delay_ms: env_or("PACING_DELAY_MS", d.pacing_delay_ms),
            startup_grace_secs: env_or("STARTUP_GRACE_SECS", d.startup_grace_secs),
            ready_retry_secs: env_or("READY_RETRY_SECS", d.ready_retry_secs),

            search_game: env_or("SEARCH_GAME", d.search_game),
            search_page_size: env_or("SEARCH_PAGE_SIZE", d.search_page_size),
        }
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }

    pub fn ready_retry(&self) -> Duration {
        Duration::from_secs(self.ready_retry_secs.max(1))
    }

    pub fn admin_quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.admin_burst_limit).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(Duration::from_secs(self.admin_period_secs.max(1)))
            .map(|quota| quota.allow_burst(burst))
            .unwrap_or_else(|| Quota::per_second(burst))
    }
}
