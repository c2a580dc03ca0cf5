//! Configuration management for the Faucet Relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::{FaucetError, FaucetResult};
use crate::tx::{TransferConfig, DEFAULT_GAS_LIMIT};

use anyhow::{Context, Result};
use ethers::types::Address;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Networks whose chain ID is known without asking the endpoint
const KNOWN_NETWORKS: &[(&str, u64)] = &[
    ("sepolia", 11_155_111),
    ("holesky", 17_000),
    ("opengradient", 10_740),
    ("base_sepolia", 84_532),
];

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Network name, used to resolve the chain ID when `chain_id` is absent
    pub network: Option<String>,
    pub chain_id: Option<u64>,
    pub rpc_urls: Vec<String>,
    /// ERC-20 contract to disperse; absent means native currency
    pub token_address: Option<String>,
    #[serde(default)]
    pub fee_scheme: FeeSchemeStrategy,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    pub max_fee_gwei: Option<u64>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeeSchemeStrategy {
    #[default]
    Legacy,
    Eip1559,
    /// Probe the latest block for a base fee
    Auto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    pub keystore_path: Option<String>,
    pub password_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_request_timeout() -> u64 {
    15
}

fn default_transfer_timeout() -> u64 {
    60
}

fn default_private_key_env() -> String {
    "PRIVATE_KEY".to_string()
}

impl Settings {
    /// Load settings from the file named by `FAUCET_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("FAUCET_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    fn parse(raw: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(raw);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.is_empty() {
            anyhow::bail!("No RPC URLs configured");
        }
        if self.chain.gas_limit < 21_000 {
            anyhow::bail!(
                "Gas limit {} is below the intrinsic cost of a transfer",
                self.chain.gas_limit
            );
        }
        if self.wallet.keystore_path.is_some() && self.wallet.password_file.is_none() {
            anyhow::bail!("Keystore configured without a password file");
        }

        self.chain.transfer_config()?;
        Ok(())
    }
}

impl ChainConfig {
    /// Chain ID from config, falling back to the known network table
    pub fn resolved_chain_id(&self) -> Option<u64> {
        self.chain_id
            .or_else(|| self.network.as_deref().and_then(known_chain_id))
    }

    /// Build the composer configuration
    pub fn transfer_config(&self) -> FaucetResult<TransferConfig> {
        let token_address = match self.token_address.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<Address>().map_err(|e| {
                FaucetError::Config(format!("Invalid token address {}: {}", raw, e))
            })?),
        };

        Ok(TransferConfig {
            chain_id: self.resolved_chain_id(),
            token_address,
            gas_limit: self.gas_limit,
            max_fee_gwei: self.max_fee_gwei,
        })
    }
}

/// Look up the chain ID of a well-known network by name
pub fn known_chain_id(network: &str) -> Option<u64> {
    let network = network.to_lowercase();
    KNOWN_NETWORKS
        .iter()
        .find(|(name, _)| *name == network)
        .map(|(_, id)| *id)
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[chain]
network = "base_sepolia"
rpc_urls = ["https://sepolia.base.org"]
token_address = "0x240b09731D96979f50B2C649C9CE10FcF9C7987F"

[wallet]
private_key_env = "FAUCET_TEST_KEY"

[api]
host = "127.0.0.1"
port = 8090

[metrics]
enabled = false
port = 9090
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("FAUCET_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${FAUCET_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_defaults_and_network_lookup() {
        let settings = Settings::parse(SAMPLE).unwrap();
        assert_eq!(settings.chain.fee_scheme, FeeSchemeStrategy::Legacy);
        assert_eq!(settings.chain.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(settings.api.transfer_timeout_secs, 60);

        let transfer = settings.chain.transfer_config().unwrap();
        assert_eq!(transfer.chain_id, Some(84_532));
        assert!(transfer.token_address.is_some());
    }

    #[test]
    fn test_explicit_chain_id_wins() {
        let raw = SAMPLE.replace("network = \"base_sepolia\"", "network = \"sepolia\"\nchain_id = 31337");
        let settings = Settings::parse(&raw).unwrap();
        assert_eq!(settings.chain.resolved_chain_id(), Some(31337));
    }

    #[test]
    fn test_unknown_network_defers_to_endpoint() {
        let raw = SAMPLE.replace("base_sepolia", "devnet");
        let settings = Settings::parse(&raw).unwrap();
        assert_eq!(settings.chain.resolved_chain_id(), None);
        assert_eq!(known_chain_id("HOLESKY"), Some(17_000));
    }

    #[test]
    fn test_empty_token_address_means_native() {
        let raw = SAMPLE.replace("0x240b09731D96979f50B2C649C9CE10FcF9C7987F", "");
        let settings = Settings::parse(&raw).unwrap();
        assert!(settings.chain.transfer_config().unwrap().token_address.is_none());
    }

    #[test]
    fn test_invalid_token_address_rejected() {
        let raw = SAMPLE.replace("0x240b09731D96979f50B2C649C9CE10FcF9C7987F", "0xnothex");
        assert!(Settings::parse(&raw).is_err());
    }

    #[test]
    fn test_missing_rpc_urls_rejected() {
        let raw = SAMPLE.replace("[\"https://sepolia.base.org\"]", "[]");
        let err = Settings::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("No RPC URLs"));
    }

    #[test]
    fn test_fee_scheme_parsing() {
        let raw = SAMPLE.replace("[wallet]", "fee_scheme = \"auto\"\n\n[wallet]");
        let settings = Settings::parse(&raw).unwrap();
        assert_eq!(settings.chain.fee_scheme, FeeSchemeStrategy::Auto);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.api.port, 8090);
        assert_eq!(settings.wallet.private_key_env, "FAUCET_TEST_KEY");
    }
}
