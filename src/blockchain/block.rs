use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::encoding;
use super::proof::ProofOfWork;
use super::transaction::Transaction;

/// Represents a block in the blockchain
///
/// A block is mined once, when it is constructed, and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the block, produced by the proof of work
    pub hash: Vec<u8>,

    /// Transactions included in this block, in order
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block; empty for the genesis block
    pub prev_hash: Vec<u8>,

    /// Nonce that solves the proof of work
    pub nonce: u64,
}

impl Block {
    /// Creates and mines a new block
    ///
    /// # Arguments
    ///
    /// * `transactions` - The transactions to include in the block
    /// * `prev_hash` - The hash of the previous block
    ///
    /// # Returns
    ///
    /// A new Block with its nonce and hash set
    pub fn new(transactions: Vec<Transaction>, prev_hash: Vec<u8>) -> Self {
        let block = Block {
            hash: Vec::new(),
            transactions,
            prev_hash,
            nonce: 0,
        };

        let (nonce, hash) = ProofOfWork::new(&block).run();

        Block {
            hash,
            nonce,
            ..block
        }
    }

    /// Creates the first block of a chain around its coinbase transaction
    pub fn genesis(coinbase: Transaction) -> Self {
        Self::new(vec![coinbase], Vec::new())
    }

    /// True for the block that starts the chain
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_empty()
    }

    /// Digest over the content hash of every transaction, in order.
    ///
    /// Hashes are recomputed from transaction content rather than taken from
    /// the stored ids, so editing any transaction byte changes the digest.
    pub fn hash_transactions(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        for transaction in &self.transactions {
            hasher.update(transaction.hash());
        }
        hasher.finalize().to_vec()
    }

    /// Checks the block's proof of work
    pub fn validate(&self) -> bool {
        ProofOfWork::new(self).validate()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        encoding::encode(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        encoding::decode(bytes)
    }
}
