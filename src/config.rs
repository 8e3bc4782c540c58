use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    /// Applies to every non-streaming call.
    pub request_timeout: Duration,
    pub analysis_timeout: Duration,
    pub state_file: PathBuf,
    pub cookie_ttl_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            request_timeout: Duration::from_secs(10),
            analysis_timeout: Duration::from_secs(60),
            state_file: PathBuf::from(".macromate/state.json"),
            cookie_ttl_days: 1,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let api_url = std::env::var("MACROMATE_API_URL").unwrap_or(defaults.api_url);
        anyhow::ensure!(
            api_url.starts_with("http://") || api_url.starts_with("https://"),
            "MACROMATE_API_URL must be an http(s) url, got {api_url}"
        );
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            request_timeout: env_secs("MACROMATE_TIMEOUT_SECS").unwrap_or(defaults.request_timeout),
            analysis_timeout: env_secs("MACROMATE_ANALYSIS_TIMEOUT_SECS")
                .unwrap_or(defaults.analysis_timeout),
            state_file: std::env::var("MACROMATE_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_file),
            cookie_ttl_days: std::env::var("MACROMATE_COOKIE_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|d| *d > 0)
                .unwrap_or(defaults.cookie_ttl_days),
        })
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn cookie_ttl(&self) -> time::Duration {
        time::Duration::days(self.cookie_ttl_days)
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
