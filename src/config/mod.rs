use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("invalid setting {0}: {1}")]
    Invalid(String, String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain: ChainConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// HTTP JSON-RPC endpoint.
    #[serde(default)]
    pub rpc_url: String,
    /// Address of the pool factory contract.
    #[serde(default)]
    pub factory_address: String,
    /// Operator key (hex) - loaded from env AGENT_PRIVATE_KEY, never from file.
    #[serde(default)]
    pub private_key: String,
    /// Block poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Blocks held back from the tip when scanning logs. Some providers
    /// report a height before every node serving eth_getLogs has the block.
    #[serde(default = "default_confirmation_lag")]
    pub confirmation_lag: u64,
    /// Maximum blocks per log-query window (bounds catch-up after downtime).
    #[serde(default = "default_max_scan_range")]
    pub max_scan_range: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Full decision sweep interval in minutes.
    #[serde(default = "default_scan_interval_minutes")]
    pub scan_interval_minutes: u64,
    /// How many hours before a payout deadline reminders start.
    #[serde(default = "default_reminder_hours")]
    pub reminder_hours_before: u64,
    /// Retry attempts for transient RPC failures.
    #[serde(default = "default_max_retries")]
    pub max_retry_attempts: u32,
    /// Per-pool refresh timeout in seconds (a broken pool must not starve
    /// the sweep).
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    /// Simultaneous in-flight pool refreshes during a sweep.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_refreshes: usize,
    /// Page size for startup pool enumeration from the factory.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Optional webhook sink for alerts. Empty = log-only notifier.
    #[serde(default)]
    pub webhook_url: String,
    /// Webhook request timeout in seconds.
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_confirmation_lag() -> u64 {
    5
}
fn default_max_scan_range() -> u64 {
    100
}
fn default_scan_interval_minutes() -> u64 {
    5
}
fn default_reminder_hours() -> u64 {
    24
}
fn default_max_retries() -> u32 {
    3
}
fn default_refresh_timeout() -> u64 {
    30
}
fn default_max_concurrent() -> usize {
    4
}
fn default_page_size() -> u64 {
    100
}
fn default_notify_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scan_interval_minutes: default_scan_interval_minutes(),
            reminder_hours_before: default_reminder_hours(),
            max_retry_attempts: default_max_retries(),
            refresh_timeout_secs: default_refresh_timeout(),
            max_concurrent_refreshes: default_max_concurrent(),
            page_size: default_page_size(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_secs: default_notify_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for
    /// endpoints and secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.overlay_env();
        Ok(config)
    }

    /// Build a config from environment variables alone (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config {
            chain: ChainConfig {
                rpc_url: String::new(),
                factory_address: String::new(),
                private_key: String::new(),
                poll_interval_secs: default_poll_interval(),
                confirmation_lag: default_confirmation_lag(),
                max_scan_range: default_max_scan_range(),
            },
            agent: AgentConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.overlay_env();
        config
    }

    fn overlay_env(&mut self) {
        if let Ok(url) = std::env::var("AGENT_RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Ok(addr) = std::env::var("AGENT_FACTORY_ADDRESS") {
            self.chain.factory_address = addr;
        }
        // The operator key is only ever accepted from the environment.
        self.chain.private_key = std::env::var("AGENT_PRIVATE_KEY").unwrap_or_default();
    }

    /// Validate once at startup. The agent is useless without chain access,
    /// so missing chain settings are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.rpc_url.is_empty() {
            return Err(ConfigError::Missing("chain.rpc_url / AGENT_RPC_URL".into()));
        }
        if self.chain.factory_address.is_empty() {
            return Err(ConfigError::Missing(
                "chain.factory_address / AGENT_FACTORY_ADDRESS".into(),
            ));
        }
        if self.chain.factory_address.parse::<alloy::primitives::Address>().is_err() {
            return Err(ConfigError::Invalid(
                "chain.factory_address".into(),
                "not a valid address".into(),
            ));
        }
        if self.chain.private_key.is_empty() {
            return Err(ConfigError::Missing("AGENT_PRIVATE_KEY".into()));
        }
        if self.chain.max_scan_range == 0 {
            return Err(ConfigError::Invalid(
                "chain.max_scan_range".into(),
                "must be at least 1".into(),
            ));
        }
        if self.agent.max_concurrent_refreshes == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_concurrent_refreshes".into(),
                "must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        let mut c = Config::from_env();
        c.chain.rpc_url = "https://forno.celo.org".into();
        c.chain.factory_address = "0x0000000000000000000000000000000000000001".into();
        c.chain.private_key = "0xabc".into();
        c
    }

    #[test]
    fn defaults_applied() {
        let config: Config = toml::from_str(
            r#"
            [chain]
            rpc_url = "https://forno.celo.org"
            factory_address = "0x0000000000000000000000000000000000000001"
            "#,
        )
        .unwrap();
        assert_eq!(config.chain.poll_interval_secs, 5);
        assert_eq!(config.chain.confirmation_lag, 5);
        assert_eq!(config.chain.max_scan_range, 100);
        assert_eq!(config.agent.reminder_hours_before, 24);
        assert_eq!(config.agent.max_retry_attempts, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn validate_rejects_missing_key() {
        let mut c = minimal();
        c.chain.private_key.clear();
        assert!(matches!(c.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn validate_rejects_bad_factory_address() {
        let mut c = minimal();
        c.chain.factory_address = "not-an-address".into();
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_, _))));
    }

    #[test]
    fn validate_accepts_minimal() {
        assert!(minimal().validate().is_ok());
    }
}
