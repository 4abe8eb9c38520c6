//! Configuration module for the feeswap service
//!
//! This module handles configuration loading from TOML files, `.env` files
//! and environment variables, and provides structured configuration types.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::lifecycle::ServiceSettings;
use crate::quote::FeeSide;
use crate::tx_builder::{BuilderOptions, SimulationPolicy, BPS_DENOMINATOR};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ledger RPC endpoint
    pub rpc: RpcConfig,

    /// Swap aggregator endpoint
    pub aggregator: AggregatorConfig,

    /// Fee terms and fee account owners
    pub fees: FeesConfig,

    #[serde(default)]
    pub quotes: QuotesConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,

    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_url")]
    pub base_url: String,

    #[serde(default = "default_aggregator_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesConfig {
    /// Platform fee charged when a quote has no referral
    #[serde(default = "default_platform_fee_bps")]
    pub default_platform_fee_bps: u16,

    #[serde(default)]
    pub fee_side: FeeSide,

    /// Owner of the intermediate fee vault; the only key the server signs with
    pub fee_vault_owner: String,

    /// Owner of the treasury fee accounts
    pub treasury_owner: String,

    /// Environment variable holding the fee-vault secret
    #[serde(default = "default_fee_vault_secret_env")]
    pub fee_vault_secret_env: String,

    /// Compare the computed fee with the aggregator's reported platform fee
    #[serde(default)]
    pub cross_check_reported_fee: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStoreKind {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotesConfig {
    #[serde(default = "default_quote_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default)]
    pub store: QuoteStoreKind,

    #[serde(default = "default_sled_path")]
    pub sled_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub policy: SimulationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Bearer tokens accepted on the swap routes
    #[serde(default)]
    pub api_tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// JSON file with `users` and `referrals` arrays
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

// Default value functions
fn default_rpc_timeout_ms() -> u64 { 10_000 }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_aggregator_url() -> String { "https://lite-api.jup.ag/swap/v1".to_string() }
fn default_aggregator_timeout_ms() -> u64 { 10_000 }
fn default_platform_fee_bps() -> u16 { 100 }
fn default_fee_vault_secret_env() -> String { "FEESWAP_FEE_VAULT_SECRET".to_string() }
fn default_quote_ttl_secs() -> u64 { 60 }
fn default_sled_path() -> PathBuf { PathBuf::from("data/quotes") }
fn default_bind() -> String { "127.0.0.1:8080".to_string() }

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_quote_ttl_secs(),
            store: QuoteStoreKind::default(),
            sled_path: default_sled_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_tokens: Vec::new(),
        }
    }
}

/// Environment variables that override file values
pub const ENV_RPC_URL: &str = "FEESWAP_RPC_URL";
pub const ENV_AGGREGATOR_URL: &str = "FEESWAP_AGGREGATOR_URL";
pub const ENV_AGGREGATOR_API_KEY: &str = "FEESWAP_AGGREGATOR_API_KEY";
pub const ENV_FEE_VAULT_OWNER: &str = "FEESWAP_FEE_VAULT_OWNER";
pub const ENV_TREASURY_OWNER: &str = "FEESWAP_TREASURY_OWNER";

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup, normally the process environment
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(url) = lookup(ENV_AGGREGATOR_URL) {
            self.aggregator.base_url = url;
        }
        if let Some(key) = lookup(ENV_AGGREGATOR_API_KEY) {
            self.aggregator.api_key = Some(key);
        }
        if let Some(owner) = lookup(ENV_FEE_VAULT_OWNER) {
            self.fees.fee_vault_owner = owner;
        }
        if let Some(owner) = lookup(ENV_TREASURY_OWNER) {
            self.fees.treasury_owner = owner;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fees.default_platform_fee_bps > BPS_DENOMINATOR {
            bail!(
                "fees.default_platform_fee_bps {} exceeds {BPS_DENOMINATOR}",
                self.fees.default_platform_fee_bps
            );
        }
        if self.quotes.ttl_secs == 0 {
            bail!("quotes.ttl_secs must be positive");
        }
        if self.rpc.timeout_ms == 0 || self.aggregator.timeout_ms == 0 {
            bail!("rpc.timeout_ms and aggregator.timeout_ms must be positive");
        }
        self.commitment()?;
        let vault = self.fee_vault_owner()?;
        let treasury = self.treasury_owner()?;
        if vault == treasury {
            bail!("fee vault and treasury must be owned by different keys");
        }
        Ok(())
    }

    pub fn commitment(&self) -> anyhow::Result<CommitmentConfig> {
        match self.rpc.commitment.as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => bail!("unknown rpc.commitment '{other}'"),
        }
    }

    pub fn fee_vault_owner(&self) -> anyhow::Result<Pubkey> {
        Pubkey::from_str(&self.fees.fee_vault_owner)
            .with_context(|| format!("fees.fee_vault_owner '{}'", self.fees.fee_vault_owner))
    }

    pub fn treasury_owner(&self) -> anyhow::Result<Pubkey> {
        Pubkey::from_str(&self.fees.treasury_owner)
            .with_context(|| format!("fees.treasury_owner '{}'", self.fees.treasury_owner))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms)
    }

    pub fn aggregator_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregator.timeout_ms)
    }

    pub fn builder_options(&self) -> BuilderOptions {
        BuilderOptions {
            simulation: self.simulation.policy,
            cross_check_reported_fee: self.fees.cross_check_reported_fee,
            ..BuilderOptions::default()
        }
    }

    pub fn service_settings(&self) -> anyhow::Result<ServiceSettings> {
        Ok(ServiceSettings {
            fee_vault_owner: self.fee_vault_owner()?,
            treasury: self.treasury_owner()?,
            default_platform_fee_bps: self.fees.default_platform_fee_bps,
            fee_side: self.fees.fee_side,
            quote_ttl: chrono::Duration::seconds(
                i64::try_from(self.quotes.ttl_secs).context("quotes.ttl_secs out of range")?,
            ),
        })
    }
}
