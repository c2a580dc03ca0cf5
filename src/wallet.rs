//! Key material loading for the faucet account

use crate::config::WalletConfig;
use crate::error::{FaucetError, FaucetResult};

use ethers::signers::{LocalWallet, Signer};
use std::env;
use tracing::info;

/// Load the signing wallet from a raw key in the environment or a keystore
pub fn load_wallet(config: &WalletConfig) -> FaucetResult<LocalWallet> {
    let wallet = match env::var(&config.private_key_env) {
        Ok(key) if !key.trim().is_empty() => from_private_key(&key)?,
        _ => from_keystore(config)?,
    };

    info!("Loaded faucet wallet {:?}", wallet.address());
    Ok(wallet)
}

/// Parse a hex private key, with or without 0x prefix
pub fn from_private_key(key: &str) -> FaucetResult<LocalWallet> {
    let key = key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);

    key.parse::<LocalWallet>()
        .map_err(|e| FaucetError::Wallet(format!("Invalid private key: {}", e)))
}

fn from_keystore(config: &WalletConfig) -> FaucetResult<LocalWallet> {
    let (Some(keystore), Some(password_file)) = (&config.keystore_path, &config.password_file)
    else {
        return Err(FaucetError::Wallet(format!(
            "No wallet configured. Set {} or configure a keystore",
            config.private_key_env
        )));
    };

    let password = std::fs::read_to_string(password_file)
        .map_err(|e| FaucetError::Wallet(format!("Failed to read password file: {}", e)))?;

    LocalWallet::decrypt_keystore(keystore, password.trim_end_matches(['\r', '\n']))
        .map_err(|e| FaucetError::Wallet(format!("Failed to decrypt keystore: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Anvil's first account
    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn config(env_name: &str) -> WalletConfig {
        WalletConfig {
            private_key_env: env_name.to_string(),
            keystore_path: None,
            password_file: None,
        }
    }

    #[test]
    fn test_wallet_with_and_without_prefix() {
        let plain = from_private_key(TEST_PRIVATE_KEY).unwrap();
        let prefixed = from_private_key(&format!("0x{}\n", TEST_PRIVATE_KEY)).unwrap();

        assert_eq!(format!("{:?}", plain.address()), TEST_ADDRESS);
        assert_eq!(plain.address(), prefixed.address());
    }

    #[test]
    fn test_invalid_private_key() {
        let err = from_private_key("invalid_key").unwrap_err();
        assert!(err.to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_load_from_env() {
        env::set_var("FAUCET_WALLET_TEST_KEY", TEST_PRIVATE_KEY);
        let wallet = load_wallet(&config("FAUCET_WALLET_TEST_KEY")).unwrap();
        assert_eq!(format!("{:?}", wallet.address()), TEST_ADDRESS);
    }

    #[test]
    fn test_missing_key_material() {
        let err = load_wallet(&config("FAUCET_WALLET_UNSET_KEY")).unwrap_err();
        assert!(matches!(err, FaucetError::Wallet(_)));
    }

    #[test]
    fn test_missing_password_file() {
        let mut cfg = config("FAUCET_WALLET_UNSET_KEY_2");
        cfg.keystore_path = Some("keystore.json".to_string());
        cfg.password_file = Some("/nonexistent/password.txt".to_string());

        let err = load_wallet(&cfg).unwrap_err();
        assert!(err.to_string().contains("password file"));
    }
}
