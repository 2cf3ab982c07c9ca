//! Runtime configuration from environment variables

use crate::orders::AggregatePolicy;
use crate::retry::ExponentialBackoff;
use std::env;
use std::time::Duration;

/// Configuration for the order-management runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct OmsConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `.sql` migration files
    pub schema_dir: String,

    /// How long a writer waits on a locked database before reporting a conflict
    pub busy_timeout_ms: u64,

    /// Retry attempts for conflicting writes
    pub retry_attempts: u32,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,

    /// Decrement aggregates when an order is deleted
    pub retract_on_delete: bool,

    /// Recompute the summary inside every order transaction
    pub refresh_summary: bool,

    /// Run the seeder before serving requests
    pub seed_on_start: bool,
}

impl OmsConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `OMS_DB_PATH` (default: data/omsmini.db)
    /// - `OMS_SCHEMA_DIR` (default: sql)
    /// - `OMS_BUSY_TIMEOUT_MS` (default: 5000)
    /// - `OMS_RETRY_ATTEMPTS` (default: 3)
    /// - `OMS_RETRY_INITIAL_MS` (default: 50)
    /// - `OMS_RETRY_MAX_MS` (default: 2000)
    /// - `OMS_RETRACT_ON_DELETE` (default: true)
    /// - `OMS_REFRESH_SUMMARY` (default: true)
    /// - `OMS_SEED_ON_START` (default: true)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("OMS_DB_PATH").unwrap_or_else(|_| "data/omsmini.db".to_string()),

            schema_dir: env::var("OMS_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),

            busy_timeout_ms: parse_var("OMS_BUSY_TIMEOUT_MS", 5_000),

            retry_attempts: parse_var("OMS_RETRY_ATTEMPTS", 3),

            retry_initial_ms: parse_var("OMS_RETRY_INITIAL_MS", 50),

            retry_max_ms: parse_var("OMS_RETRY_MAX_MS", 2_000),

            retract_on_delete: parse_var("OMS_RETRACT_ON_DELETE", true),

            refresh_summary: parse_var("OMS_REFRESH_SUMMARY", true),

            seed_on_start: parse_var("OMS_SEED_ON_START", true),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn policy(&self) -> AggregatePolicy {
        AggregatePolicy {
            retract_on_delete: self.retract_on_delete,
            refresh_summary: self.refresh_summary,
        }
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.retry_initial_ms, self.retry_max_ms, self.retry_attempts)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().to_lowercase().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases share process-wide env vars, so they run in one test.
    #[test]
    fn test_default_and_custom_config() {
        for var in [
            "OMS_DB_PATH",
            "OMS_SCHEMA_DIR",
            "OMS_BUSY_TIMEOUT_MS",
            "OMS_RETRY_ATTEMPTS",
            "OMS_RETRACT_ON_DELETE",
            "OMS_REFRESH_SUMMARY",
            "OMS_SEED_ON_START",
        ] {
            env::remove_var(var);
        }

        let config = OmsConfig::from_env();

        assert_eq!(config.db_path, "data/omsmini.db");
        assert_eq!(config.schema_dir, "sql");
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert_eq!(config.retry_attempts, 3);
        assert!(config.retract_on_delete);
        assert!(config.refresh_summary);
        assert!(config.seed_on_start);

        env::set_var("OMS_DB_PATH", "/tmp/oms-test.db");
        env::set_var("OMS_BUSY_TIMEOUT_MS", "250");
        env::set_var("OMS_RETRACT_ON_DELETE", "FALSE");
        env::set_var("OMS_RETRY_ATTEMPTS", "not-a-number");

        let config = OmsConfig::from_env();

        assert_eq!(config.db_path, "/tmp/oms-test.db");
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
        assert!(!config.retract_on_delete);
        assert!(!config.policy().retract_on_delete);
        assert_eq!(config.retry_attempts, 3);

        env::remove_var("OMS_DB_PATH");
        env::remove_var("OMS_BUSY_TIMEOUT_MS");
        env::remove_var("OMS_RETRACT_ON_DELETE");
        env::remove_var("OMS_RETRY_ATTEMPTS");
    }
}
