use std::path::Path;

use log::debug;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Db, IVec, Tree};
use thiserror::Error;

use super::block::Block;

/// Key under which the hash of the newest block is kept
pub const LAST_HASH_KEY: &[u8] = b"lastHash";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Chain tip moved: expected {expected}, found {found}")]
    TipMismatch { expected: String, found: String },
}

/// Persistent chain storage.
///
/// One sled tree maps every block hash to its serialized block, plus the
/// distinguished `lastHash` key pointing at the tip. Blocks are only ever
/// appended; the tip pointer is the only value that is overwritten.
pub struct ChainStore {
    /// The database instance
    db: Db,

    /// Tree for blocks and the tip pointer
    blocks: Tree,
}

impl std::fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStore").finish()
    }
}

impl ChainStore {
    /// Opens (or creates) the chain database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the database directory
    ///
    /// # Returns
    ///
    /// A new ChainStore instance
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }

    /// Opens a throwaway database that is removed when dropped
    #[cfg(test)]
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let blocks = db.open_tree("blocks")?;
        Ok(Self { db, blocks })
    }

    /// True once a genesis block has been written
    pub fn has_chain(&self) -> Result<bool, StorageError> {
        Ok(self.blocks.contains_key(LAST_HASH_KEY)?)
    }

    /// Gets the hash of the newest block
    pub fn get_last_hash(&self) -> Result<Vec<u8>, StorageError> {
        match self.blocks.get(LAST_HASH_KEY)? {
            Some(value) => Ok(value.to_vec()),
            None => Err(StorageError::NotFound("Last hash not found".to_string())),
        }
    }

    /// Gets a block by its hash
    ///
    /// # Arguments
    ///
    /// * `hash` - The hash of the block
    ///
    /// # Returns
    ///
    /// The block if found
    pub fn get_block(&self, hash: &[u8]) -> Result<Block, StorageError> {
        match self.blocks.get(hash)? {
            Some(value) => decode_block(&value),
            None => Err(StorageError::NotFound(format!(
                "Block with hash {} not found",
                hex::encode(hash)
            ))),
        }
    }

    /// Reads the tip pointer and the block it names in one read transaction
    pub fn get_tip(&self) -> Result<Block, StorageError> {
        let result: TransactionResult<Option<IVec>, StorageError> = self.blocks.transaction(|tx| {
            let Some(last_hash) = tx.get(LAST_HASH_KEY)? else {
                return Ok(None);
            };
            match tx.get(&last_hash)? {
                Some(bytes) => Ok(Some(bytes)),
                None => Err(ConflictableTransactionError::Abort(StorageError::NotFound(format!(
                    "Tip block {} not found",
                    hex::encode(&last_hash)
                )))),
            }
        });

        match flatten(result)? {
            Some(bytes) => decode_block(&bytes),
            None => Err(StorageError::NotFound("Last hash not found".to_string())),
        }
    }

    /// Writes `block` and advances the tip pointer to it atomically.
    ///
    /// The write is refused if the stored tip is not `block.prev_hash`
    /// (or, for a genesis block, if any tip exists at all).
    pub fn append_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = block
            .serialize()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let result: TransactionResult<(), StorageError> = self.blocks.transaction(|tx| {
            let current = tx.get(LAST_HASH_KEY)?;
            let current = current.as_deref().unwrap_or(&[]);
            if current != block.prev_hash.as_slice() {
                return Err(ConflictableTransactionError::Abort(StorageError::TipMismatch {
                    expected: hex::encode(&block.prev_hash),
                    found: hex::encode(current),
                }));
            }

            tx.insert(block.hash.as_slice(), value.as_slice())?;
            tx.insert(LAST_HASH_KEY, block.hash.as_slice())?;
            Ok(())
        });
        flatten(result)?;

        self.flush()?;
        debug!("Stored block {} ({} bytes)", hex::encode(&block.hash), value.len());
        Ok(())
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_block(bytes: &[u8]) -> Result<Block, StorageError> {
    Block::deserialize(bytes).map_err(|e| StorageError::DeserializationError(e.to_string()))
}

fn flatten<T>(result: TransactionResult<T, StorageError>) -> Result<T, StorageError> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StorageError::DatabaseError(e),
    })
}
