//! Configuration for the lookup table flow
//!
//! Loaded from a TOML file, then overridden by environment variables
//! (`.env` is honoured), then by CLI flags in the binary.

use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};

use crate::lookup_table::MAX_EXTEND_BATCH;
use crate::pipeline::PipelineSettings;
use crate::retry::PollPolicy;

pub const ENV_RPC_URL: &str = "LUT_FLOW_RPC_URL";
pub const ENV_COMMITMENT: &str = "LUT_FLOW_COMMITMENT";
pub const ENV_OUTPUT_DIR: &str = "LUT_FLOW_OUTPUT_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
    pub lookup_table: LookupTableConfig,
    pub confirmation: ConfirmationConfig,
    pub recorder: RecorderConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// `processed`, `confirmed` or `finalized`
    pub commitment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Keypair file of the funding wallet
    pub funding_keypair_path: String,

    /// Lamports moved to the flow's ephemeral payer
    pub fund_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupTableConfig {
    /// Addresses per extend transaction
    pub extend_batch_size: usize,

    pub fetch_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    pub confirm_timeout_secs: u64,
    pub max_resign_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub output_dir: String,
    pub fetch_max_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8899".to_string(),
            timeout_secs: 30,
            commitment: "confirmed".to_string(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            funding_keypair_path: "~/.config/solana/id.json".to_string(),
            fund_lamports: 1_000_000_000,
        }
    }
}

impl Default for LookupTableConfig {
    fn default() -> Self {
        Self {
            extend_batch_size: 20,
            fetch_max_attempts: 30,
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_initial_ms: 1000,
            poll_max_ms: 4000,
            confirm_timeout_secs: 90,
            max_resign_attempts: 2,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: ".".to_string(),
            fetch_max_attempts: 30,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path))?;
        Ok(config)
    }

    /// Load the file (or defaults when `path` is `None`), then apply `.env`
    /// and environment overrides
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from `lookup`; split out so tests need not touch the
    /// process environment
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(commitment) = lookup(ENV_COMMITMENT) {
            self.rpc.commitment = commitment;
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.recorder.output_dir = dir;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.url.trim().is_empty() {
            bail!("rpc.url must not be empty");
        }
        if self.rpc.timeout_secs == 0 {
            bail!("rpc.timeout_secs must be positive");
        }
        parse_commitment(&self.rpc.commitment)?;

        let batch = self.lookup_table.extend_batch_size;
        if batch == 0 || batch > MAX_EXTEND_BATCH {
            bail!(
                "lookup_table.extend_batch_size must be within 1..={}, got {}",
                MAX_EXTEND_BATCH,
                batch
            );
        }
        if self.lookup_table.fetch_max_attempts == 0 {
            bail!("lookup_table.fetch_max_attempts must be positive");
        }

        let c = &self.confirmation;
        if c.poll_initial_ms == 0 {
            bail!("confirmation.poll_initial_ms must be positive");
        }
        if c.poll_max_ms < c.poll_initial_ms {
            bail!(
                "confirmation.poll_max_ms ({}) is below poll_initial_ms ({})",
                c.poll_max_ms,
                c.poll_initial_ms
            );
        }
        if c.confirm_timeout_secs == 0 {
            bail!("confirmation.confirm_timeout_secs must be positive");
        }

        if self.recorder.output_dir.trim().is_empty() {
            bail!("recorder.output_dir must not be empty");
        }
        if self.recorder.fetch_max_attempts == 0 {
            bail!("recorder.fetch_max_attempts must be positive");
        }
        Ok(())
    }

    pub fn commitment(&self) -> anyhow::Result<CommitmentConfig> {
        parse_commitment(&self.rpc.commitment)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    /// Backoff used for confirmation; shared as the base of every other wait
    pub fn confirm_policy(&self) -> PollPolicy {
        let c = &self.confirmation;
        PollPolicy {
            initial_delay: Duration::from_millis(c.poll_initial_ms),
            max_delay: Duration::from_millis(c.poll_max_ms),
            max_attempts: None,
            deadline: Some(Duration::from_secs(c.confirm_timeout_secs)),
            ..PollPolicy::default()
        }
    }

    pub fn table_fetch_policy(&self) -> PollPolicy {
        self.confirm_policy()
            .with_max_attempts(Some(self.lookup_table.fetch_max_attempts))
    }

    pub fn record_fetch_policy(&self) -> PollPolicy {
        self.confirm_policy()
            .with_max_attempts(Some(self.recorder.fetch_max_attempts))
    }

    pub fn pipeline_settings(&self) -> anyhow::Result<PipelineSettings> {
        Ok(PipelineSettings {
            commitment: self.commitment()?,
            confirm_policy: self.confirm_policy(),
            max_resign_attempts: self.confirmation.max_resign_attempts,
            ..PipelineSettings::default()
        })
    }
}

/// Parse a commitment name; there is no implicit fallback
pub fn parse_commitment(value: &str) -> anyhow::Result<CommitmentConfig> {
    let level = match value.trim().to_ascii_lowercase().as_str() {
        "processed" => CommitmentLevel::Processed,
        "confirmed" => CommitmentLevel::Confirmed,
        "finalized" => CommitmentLevel::Finalized,
        other => bail!("unknown commitment level {:?}", other),
    };
    Ok(CommitmentConfig { commitment: level })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.commitment().unwrap(), CommitmentConfig::confirmed());
        assert_eq!(config.confirm_policy().initial_delay, Duration::from_millis(1000));
        assert_eq!(config.pipeline_settings().unwrap().max_resign_attempts, 2);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rpc]\nurl = \"http://localhost:9999\"\n\n[lookup_table]\nextend_batch_size = 10\n"
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.rpc.url, "http://localhost:9999");
        assert_eq!(config.rpc.commitment, "confirmed");
        assert_eq!(config.lookup_table.extend_batch_size, 10);
        assert_eq!(config.confirmation.max_resign_attempts, 2);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ENV_RPC_URL => Some("http://override:8899".to_string()),
            ENV_COMMITMENT => Some("finalized".to_string()),
            _ => None,
        });
        assert_eq!(config.rpc.url, "http://override:8899");
        assert_eq!(config.commitment().unwrap(), CommitmentConfig::finalized());
        assert_eq!(config.recorder.output_dir, ".");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::default();
        config.lookup_table.extend_batch_size = MAX_EXTEND_BATCH + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.confirmation.poll_max_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rpc.commitment = "max".to_string();
        assert!(config.validate().is_err());
    }
}
