use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the repair order workflow
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Waiting for an idle technician
    pub assignment: WaitConfig,
    /// Waiting for payment confirmation
    pub payment: WaitConfig,
    /// Step execution settings
    pub work: WorkConfig,
    /// Logging and metrics settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WaitConfig {
    /// Pause between two probes
    pub poll_interval_ms: u64,
    /// Give up after this long
    pub timeout_seconds: u64,
}

impl WaitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkConfig {
    /// Total attempts per step, the first one included
    pub max_step_attempts: u32,
    /// Pause before retrying a failed step
    pub retry_delay_ms: u64,
}

impl WorkConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit structured JSON logs instead of plain text
    pub json_logs: bool,
    /// Log workflow counters after every processed order
    pub metrics_enabled: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            assignment: WaitConfig {
                poll_interval_ms: 30_000,     // 30 seconds
                timeout_seconds: 8 * 60 * 60, // one shift
            },
            payment: WaitConfig {
                poll_interval_ms: 60_000,            // 1 minute
                timeout_seconds: 14 * 24 * 60 * 60, // invoice expires after 14 days
            },
            work: WorkConfig {
                max_step_attempts: 3,
                retry_delay_ms: 5_000,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
                metrics_enabled: true,
            },
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (repair-order.toml)
    /// 3. Environment variables (REPAIR_ORDER__SECTION__KEY)
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .add_source(Config::try_from(&WorkflowConfig::default())?)
            .add_source(File::with_name("repair-order").required(false))
            .add_source(
                Environment::with_prefix("REPAIR_ORDER")
                    .separator("__")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load defaults overlaid with one explicit file
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&WorkflowConfig::default())?)
            .add_source(File::from(path.as_ref()))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<WorkflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = WorkflowConfig::load_env_file();
        WorkflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static WorkflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_bound_both_waits() {
        let config = WorkflowConfig::default();
        assert_eq!(config.assignment.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.payment.timeout(), Duration::from_secs(14 * 24 * 60 * 60));
        assert_eq!(config.work.max_step_attempts, 3);
    }

    #[test]
    fn test_load_from_overrides_only_given_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[assignment]\ntimeout_seconds = 60\n\n[work]\nmax_step_attempts = 5").unwrap();

        let config = WorkflowConfig::load_from(file.path()).unwrap();

        assert_eq!(config.assignment.timeout_seconds, 60);
        assert_eq!(config.assignment.poll_interval_ms, 30_000);
        assert_eq!(config.work.max_step_attempts, 5);
        assert_eq!(config.payment, WorkflowConfig::default().payment);
    }

    #[test]
    fn test_saved_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repair-order.toml");

        let mut config = WorkflowConfig::default();
        config.payment.poll_interval_ms = 250;
        config.observability.json_logs = false;
        config.save_to_file(&path).unwrap();

        assert_eq!(WorkflowConfig::load_from(&path).unwrap(), config);
    }
}
