// Blockchain module
//
// This module contains the ledger engine:
// - Block structure and proof of work
// - Transaction / UTXO model
// - Chain storage, the ledger handle and its iterator
// - Key handling and the node's wallet file

pub mod block;
pub mod chain;
pub mod crypto;
pub mod encoding;
pub mod iterator;
pub mod proof;
pub mod storage;
pub mod transaction;
pub mod wallets;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError};
pub use crypto::Address;
pub use storage::ChainStore;
pub use transaction::Transaction;
pub use wallets::Wallets;
