//! Runtime configuration, loaded from `callsight.toml` with env overrides
//! applied in the binary.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Config {
    /// Sanity-check the loaded config. Errors abort startup; warnings log.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.llm.max_tokens == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "llm.max_tokens must be positive".into(),
            });
        }
        if self.llm.input_rate_per_million < 0.0 || self.llm.output_rate_per_million < 0.0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "llm token rates must be non-negative".into(),
            });
        }
        if self.sweeper.interval_secs < 30 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!(
                    "sweeper.interval_secs = {} is aggressive; ticks must not overlap",
                    self.sweeper.interval_secs
                ),
            });
        }
        if self.calendar.recency_window_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "calendar.recency_window_secs = 0 disables duplicate-push filtering".into(),
            });
        }
        if self.alerts.webhook_url.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "alerts.webhook_url unset; critical/high alerts will be log-only".into(),
            });
        }
        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Env var holding the admin bearer token. Read once at startup; unset
    /// means admin endpoints run unauthenticated (dev mode).
    #[serde(default = "d_admin_token_env")]
    pub admin_token_env: String,
    /// Public base URL webhooks are registered against.
    #[serde(default = "d_public_url")]
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            admin_token_env: d_admin_token_env(),
            public_base_url: d_public_url(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_llm_base_url")]
    pub base_url: String,
    /// Env var holding the provider API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// USD per million input tokens, for cost tracking.
    #[serde(default = "d_rate_in")]
    pub input_rate_per_million: f64,
    /// USD per million output tokens.
    #[serde(default = "d_rate_out")]
    pub output_rate_per_million: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: d_model(),
            max_tokens: d_max_tokens(),
            base_url: d_llm_base_url(),
            api_key_env: d_api_key_env(),
            input_rate_per_million: d_rate_in(),
            output_rate_per_million: d_rate_out(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sweeper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "d_sweep_interval")]
    pub interval_secs: u64,
    /// Minutes past the appointment end before a Waiting call is ghosted.
    #[serde(default = "d_ghost_timeout")]
    pub ghost_timeout_minutes: i64,
    /// Lookback window for the pull-based transcript catch-up phase.
    #[serde(default = "d_pull_lookback")]
    pub pull_lookback_hours: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: d_sweep_interval(),
            ghost_timeout_minutes: d_ghost_timeout(),
            pull_lookback_hours: d_pull_lookback(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Calendar ingestion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// How far back the delta fetch reaches on each push notification.
    #[serde(default = "d_delta_window")]
    pub delta_window_minutes: i64,
    /// In-memory duplicate-push suppression window.
    #[serde(default = "d_recency_window")]
    pub recency_window_secs: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            delta_window_minutes: d_delta_window(),
            recency_window_secs: d_recency_window(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Push channels
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Subscriptions expiring within this lookahead are renewed.
    #[serde(default = "d_renewal_lookahead")]
    pub renewal_lookahead_hours: i64,
    #[serde(default = "d_renewal_interval")]
    pub renewal_interval_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            renewal_lookahead_hours: d_renewal_lookahead(),
            renewal_interval_secs: d_renewal_interval(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Alerts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlertsConfig {
    /// Synchronous channel for critical/high alerts. `None` = log only.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

// ── serde defaults ──────────────────────────────────────────────────

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    4020
}
fn d_admin_token_env() -> String {
    "CS_ADMIN_TOKEN".into()
}
fn d_public_url() -> String {
    "http://localhost:4020".into()
}
fn d_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn d_max_tokens() -> u32 {
    4096
}
fn d_llm_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn d_api_key_env() -> String {
    "CS_LLM_API_KEY".into()
}
fn d_rate_in() -> f64 {
    3.0
}
fn d_rate_out() -> f64 {
    15.0
}
fn d_sweep_interval() -> u64 {
    300
}
fn d_ghost_timeout() -> i64 {
    120
}
fn d_pull_lookback() -> i64 {
    6
}
fn d_delta_window() -> i64 {
    5
}
fn d_recency_window() -> u64 {
    60
}
fn d_renewal_lookahead() -> i64 {
    24
}
fn d_renewal_interval() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.sweeper.interval_secs, 300);
        assert_eq!(c.sweeper.ghost_timeout_minutes, 120);
        assert_eq!(c.sweeper.pull_lookback_hours, 6);
        assert_eq!(c.calendar.delta_window_minutes, 5);
        assert_eq!(c.calendar.recency_window_secs, 60);
        assert_eq!(c.push.renewal_lookahead_hours, 24);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str(
            r#"
[server]
port = 9000

[llm]
model = "claude-haiku-4"
"#,
        )
        .unwrap();
        assert_eq!(c.server.port, 9000);
        assert_eq!(c.server.host, "127.0.0.1");
        assert_eq!(c.llm.model, "claude-haiku-4");
        assert_eq!(c.llm.max_tokens, 4096);
    }

    #[test]
    fn zero_max_tokens_is_an_error() {
        let mut c = Config::default();
        c.llm.max_tokens = 0;
        assert!(c
            .validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error));
    }
}
