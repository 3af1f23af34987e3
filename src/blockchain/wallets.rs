use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::info;
use thiserror::Error;

use super::crypto::{Address, CryptoError, Wallet};

/// Errors that can occur while loading or saving wallets
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Wallet file is malformed: {0}")]
    FormatError(#[from] serde_json::Error),

    #[error("Invalid key in wallet file: {0}")]
    KeyError(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// The wallets owned by this node, keyed by address.
///
/// On disk the collection is a JSON object mapping each address to its
/// hex-encoded secret key.
#[derive(Debug, Clone, Default)]
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
}

impl Wallets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the wallets stored at `path`; a missing file is an empty collection
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let stored: HashMap<String, String> = serde_json::from_str(&content)?;

        let mut wallets = HashMap::with_capacity(stored.len());
        for (address, secret_hex) in stored {
            let secret = hex::decode(&secret_hex)
                .map_err(|e| WalletError::KeyError(format!("{}: {}", address, e)))?;
            let wallet = Wallet::from_secret_key(&secret)?;

            if wallet.address().0 != address {
                return Err(WalletError::KeyError(format!(
                    "{}: key belongs to {}",
                    address,
                    wallet.address()
                )));
            }
            wallets.insert(address, wallet);
        }

        info!("Loaded {} wallet(s) from {}", wallets.len(), path.display());
        Ok(Wallets { wallets })
    }

    /// Writes the collection to `path`, creating parent directories as needed
    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<(), WalletError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let stored: HashMap<&str, String> = self
            .wallets
            .iter()
            .map(|(address, wallet)| (address.as_str(), hex::encode(wallet.export_secret_key())))
            .collect();

        fs::write(path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }

    /// Generates a new wallet and returns its address
    pub fn add_wallet(&mut self) -> Address {
        let wallet = Wallet::new();
        let address = wallet.address().clone();
        self.wallets.insert(address.0.clone(), wallet);
        address
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    /// All addresses, sorted
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
