use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// PostgreSQL connection URL; the in-memory store is used when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "registry_transfer.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            transfer: TransferConfig::default(),
            flow: FlowConfig::default(),
            scheduler: SchedulerConfig::default(),
            postgres_url: None,
        }
    }
}

/// Registry transfer policy
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    /// Response window before a pending transfer is server approved
    pub automatic_transfer_days: i64,
    /// A resource transferred more recently than this cannot be transferred again
    pub transfer_lock_days: i64,
    /// The only transfer period accepted
    pub transfer_period_years: u32,
    pub transfer_cost: Decimal,
    pub currency: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            automatic_transfer_days: 5,
            transfer_lock_days: 60,
            transfer_period_years: 1,
            transfer_cost: Decimal::new(800, 2),
            currency: "USD".to_string(),
        }
    }
}

impl TransferConfig {
    pub fn automatic_transfer_length(&self) -> chrono::Duration {
        chrono::Duration::days(self.automatic_transfer_days)
    }

    pub fn transfer_lock_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.transfer_lock_days)
    }
}

/// Retry policy for store contention inside one command
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FlowConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 25,
        }
    }
}

impl FlowConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Automatic approval scanning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub scan_interval_secs: u64,
    pub batch_size: usize,
    /// Firings of one transfer before it is parked for an operator
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            batch_size: 100,
            max_retries: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
        }
    }
}

impl SchedulerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Exponential backoff before retry `attempt` (1-based), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let yaml = r#"
log_level: "debug"
log_dir: "./logs"
log_file: "transfer.log"
use_json: false
rotation: "never"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.transfer.automatic_transfer_days, 5);
        assert_eq!(config.transfer.transfer_cost, Decimal::new(800, 2));
        assert_eq!(config.flow.max_attempts, 3);
        assert!(config.postgres_url.is_none());
    }

    #[test]
    fn test_transfer_section() {
        let yaml = r#"
log_level: "info"
log_dir: "./logs"
log_file: "transfer.log"
use_json: true
rotation: "daily"
transfer:
  automatic_transfer_days: 3
  transfer_lock_days: 0
  transfer_period_years: 1
  transfer_cost: "12.50"
  currency: "EUR"
postgres_url: "postgres://localhost/registry"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();

        assert_eq!(
            config.transfer.automatic_transfer_length(),
            chrono::Duration::days(3)
        );
        assert_eq!(config.transfer.transfer_cost, Decimal::new(1250, 2));
        assert_eq!(config.transfer.currency, "EUR");
        assert_eq!(
            config.postgres_url.as_deref(),
            Some("postgres://localhost/registry")
        );
    }

    #[test]
    fn test_scheduler_backoff_is_capped() {
        let config = SchedulerConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(400));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
        assert_eq!(config.backoff(30), Duration::from_millis(10_000));
    }

    #[test]
    fn test_missing_config_file() {
        assert!(AppConfig::load("does-not-exist").is_err());
    }
}
