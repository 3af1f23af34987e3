use std::path::PathBuf;

use thiserror::Error;

use crate::blockchain::Address;

/// Errors that can occur while reading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Process configuration, read from `LEDGER_*` environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory of the chain database
    pub data_dir: PathBuf,

    /// JSON file holding this node's wallets
    pub wallet_file: PathBuf,

    pub host: String,
    pub port: u16,

    /// Address paid by the genesis coinbase when a new chain is created.
    /// A fresh wallet is used when unset.
    pub genesis_address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data/blockchain"),
            wallet_file: PathBuf::from("data/wallets.json"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            genesis_address: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(dir) = lookup("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("LEDGER_WALLET_FILE") {
            config.wallet_file = PathBuf::from(file);
        }
        if let Some(host) = lookup("LEDGER_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("LEDGER_PORT") {
            config.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "LEDGER_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(address) = lookup("LEDGER_GENESIS_ADDRESS").filter(|a| !a.is_empty()) {
            if !Address(address.clone()).is_valid() {
                return Err(ConfigError::InvalidValue {
                    name: "LEDGER_GENESIS_ADDRESS",
                    value: address,
                });
            }
            config.genesis_address = Some(address);
        }

        Ok(config)
    }
}
