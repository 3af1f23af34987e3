use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use super::block::Block;
use super::crypto::{hash_pub_key, Ed25519Verifier, SignatureVerifier};
use super::iterator::ChainIterator;
use super::storage::{ChainStore, StorageError};
use super::transaction::{Transaction, TransactionError, TxOutput, COINBASE_REWARD};

/// Output indexes per transaction hash
pub type OutputIndexes = HashMap<Vec<u8>, Vec<i64>>;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Blockchain already exists")]
    AlreadyExists,

    #[error("No existing blockchain found")]
    NotFound,

    #[error("Reached the end of the chain")]
    EndOfChain,

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

/// Every persisted transaction by hash, plus every output already spent
struct ChainIndex {
    transactions: HashMap<Vec<u8>, Transaction>,
    spent: HashSet<(Vec<u8>, i64)>,
}

/// Handle on a persisted chain.
///
/// The handle owns the tip pointer; the store owns the block records.
pub struct Blockchain {
    store: ChainStore,
    last_hash: Vec<u8>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl std::fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blockchain")
            .field("last_hash", &hex::encode(&self.last_hash))
            .finish()
    }
}

impl Blockchain {
    /// Creates a new chain whose genesis block pays the coinbase reward to
    /// `genesis_recipient`
    ///
    /// # Arguments
    ///
    /// * `store` - The storage the chain is written to
    /// * `genesis_recipient` - Public key hash receiving the genesis coinbase
    ///
    /// # Returns
    ///
    /// The new Blockchain, or `AlreadyExists` if the store holds a chain
    pub fn create(store: ChainStore, genesis_recipient: &[u8]) -> Result<Self, BlockchainError> {
        if store.has_chain()? {
            return Err(BlockchainError::AlreadyExists);
        }

        let coinbase = Transaction::new_coinbase(genesis_recipient, "First transaction from Genesis");
        let genesis = Block::genesis(coinbase);
        store.append_block(&genesis)?;

        info!("Created blockchain with genesis block {}", hex::encode(&genesis.hash));

        Ok(Blockchain {
            store,
            last_hash: genesis.hash,
            verifier: Arc::new(Ed25519Verifier),
        })
    }

    /// Opens the chain already present in `store`
    pub fn open(store: ChainStore) -> Result<Self, BlockchainError> {
        let last_hash = match store.get_last_hash() {
            Ok(hash) => hash,
            Err(StorageError::NotFound(_)) => return Err(BlockchainError::NotFound),
            Err(err) => return Err(err.into()),
        };

        info!("Opened blockchain at tip {}", hex::encode(&last_hash));

        Ok(Blockchain {
            store,
            last_hash,
            verifier: Arc::new(Ed25519Verifier),
        })
    }

    /// Replaces the signature scheme used to check transactions
    #[cfg(test)]
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Hash of the newest block
    pub fn last_hash(&self) -> &[u8] {
        &self.last_hash
    }

    /// A fresh cursor starting at the tip
    pub fn iterator(&self) -> ChainIterator<'_> {
        ChainIterator::new(&self.store, self.last_hash.clone())
    }

    /// The newest block, read together with the tip pointer
    pub fn last_block(&self) -> Result<Block, BlockchainError> {
        Ok(self.store.get_tip()?)
    }

    /// Mines a block holding `transactions` on top of the tip and appends it
    ///
    /// The transactions are checked against the chain first: signatures,
    /// ownership of every spent output, no double spends, and no value
    /// created outside a leading coinbase. Mining happens before the storage
    /// transaction that writes the block and the tip pointer together.
    ///
    /// # Arguments
    ///
    /// * `transactions` - The transactions to include in the block
    ///
    /// # Returns
    ///
    /// The newly mined block
    pub fn add_block(&mut self, transactions: Vec<Transaction>) -> Result<Block, BlockchainError> {
        self.check_transactions(&transactions)?;

        let tip = self.last_block()?;
        let block = Block::new(transactions, tip.hash);
        self.store.append_block(&block)?;
        self.last_hash = block.hash.clone();

        info!(
            "Added block {} with {} transaction(s)",
            hex::encode(&block.hash),
            block.transactions.len()
        );

        Ok(block)
    }

    /// Chain-aware validation of a single transaction.
    ///
    /// Returns `Ok(false)` for a transaction that would be rejected by
    /// [`Blockchain::add_block`]; errors only on storage failures.
    pub fn verify_transaction(&self, transaction: &Transaction) -> Result<bool, BlockchainError> {
        match self.check_transactions(std::slice::from_ref(transaction)) {
            Ok(()) => Ok(true),
            Err(BlockchainError::InvalidTransaction(reason)) => {
                debug!("Transaction {} failed verification: {}", hex::encode(&transaction.hash_id), reason);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn check_transactions(&self, transactions: &[Transaction]) -> Result<(), BlockchainError> {
        let index = self.index_chain()?;
        let mut claimed: HashSet<(Vec<u8>, i64)> = HashSet::new();

        for (position, transaction) in transactions.iter().enumerate() {
            let id = hex::encode(&transaction.hash_id);
            let reject = |reason: String| -> Result<(), BlockchainError> {
                warn!("Rejected transaction {}: {}", id, reason);
                Err(BlockchainError::InvalidTransaction(format!("{}: {}", id, reason)))
            };

            if transaction.hash_id != transaction.hash() {
                return reject("hash id does not match content".to_string());
            }

            if transaction.is_coinbase() {
                if position != 0 {
                    return reject("coinbase must be the first transaction of a block".to_string());
                }
                if transaction.outputs.len() != 1 || transaction.outputs[0].value != COINBASE_REWARD {
                    return reject(format!("coinbase must pay a single output of {}", COINBASE_REWARD));
                }
                continue;
            }

            if transaction.inputs.is_empty() {
                return reject("no inputs".to_string());
            }

            let mut input_total: u64 = 0;
            for input in &transaction.inputs {
                let outpoint = (input.prev_tx_hash.clone(), input.out_idx);
                if index.spent.contains(&outpoint) || !claimed.insert(outpoint) {
                    return reject(format!(
                        "output {}:{} is already spent",
                        hex::encode(&input.prev_tx_hash),
                        input.out_idx
                    ));
                }

                let source = index.transactions.get(&input.prev_tx_hash);
                let output = source.and_then(|tx| {
                    usize::try_from(input.out_idx)
                        .ok()
                        .and_then(|idx| tx.outputs.get(idx))
                });
                let Some(output) = output else {
                    return reject(format!(
                        "unknown output {}:{}",
                        hex::encode(&input.prev_tx_hash),
                        input.out_idx
                    ));
                };

                if !output.is_locked_with(&hash_pub_key(&input.pub_key)) {
                    return reject("input key does not own the spent output".to_string());
                }
                let Some(total) = input_total.checked_add(output.value) else {
                    return reject("inputs total overflows".to_string());
                };
                input_total = total;
            }

            let Some(output_total) = transaction.output_total() else {
                return reject("outputs total overflows".to_string());
            };
            if output_total > input_total {
                return reject(format!(
                    "outputs total {} exceeds inputs total {}",
                    output_total, input_total
                ));
            }

            if !transaction.verify(self.verifier.as_ref()) {
                return reject("invalid signature".to_string());
            }
        }

        Ok(())
    }

    fn index_chain(&self) -> Result<ChainIndex, BlockchainError> {
        let mut index = ChainIndex {
            transactions: HashMap::new(),
            spent: HashSet::new(),
        };

        for block in self.iterator() {
            for transaction in block?.transactions {
                if !transaction.is_coinbase() {
                    for input in &transaction.inputs {
                        index.spent.insert((input.prev_tx_hash.clone(), input.out_idx));
                    }
                }
                index.transactions.insert(transaction.hash_id.clone(), transaction);
            }
        }

        Ok(index)
    }

    /// Walks the chain from the tip and returns the transactions that still
    /// hold an unspent output for `pub_key_hash`, together with every output
    /// of that key already consumed
    fn scan_unspent(&self, pub_key_hash: &[u8]) -> Result<(Vec<Transaction>, OutputIndexes), BlockchainError> {
        let mut unspent = Vec::new();
        let mut spent: OutputIndexes = HashMap::new();

        for block in self.iterator() {
            // Newest first inside a block as well: a spender always follows
            // the output it spends
            for transaction in block?.transactions.into_iter().rev() {
                if !transaction.is_coinbase() {
                    for input in &transaction.inputs {
                        if input.uses_key(pub_key_hash) {
                            spent
                                .entry(input.prev_tx_hash.clone())
                                .or_default()
                                .push(input.out_idx);
                        }
                    }
                }

                let has_unspent = transaction
                    .outputs
                    .iter()
                    .enumerate()
                    .any(|(idx, output)| {
                        output.is_locked_with(pub_key_hash)
                            && !is_spent(&spent, &transaction.hash_id, idx)
                    });
                if has_unspent {
                    unspent.push(transaction);
                }
            }
        }

        Ok((unspent, spent))
    }

    /// Transactions holding at least one unspent output locked to `pub_key_hash`
    pub fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<Transaction>, BlockchainError> {
        Ok(self.scan_unspent(pub_key_hash)?.0)
    }

    /// Collects unspent outputs of `pub_key_hash` until they cover `amount`.
    ///
    /// Collection stops as soon as the running total reaches `amount`, so
    /// the chosen outputs are the first ones found walking back from the tip,
    /// not necessarily the largest.
    ///
    /// # Returns
    ///
    /// The accumulated value and the chosen output indexes per transaction hash
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, OutputIndexes), BlockchainError> {
        let (unspent, spent) = self.scan_unspent(pub_key_hash)?;
        let mut accumulated: u64 = 0;
        let mut outputs: OutputIndexes = HashMap::new();

        'scan: for transaction in &unspent {
            for (idx, output) in transaction.outputs.iter().enumerate() {
                if !output.is_locked_with(pub_key_hash) || is_spent(&spent, &transaction.hash_id, idx) {
                    continue;
                }

                accumulated += output.value;
                outputs
                    .entry(transaction.hash_id.clone())
                    .or_default()
                    .push(idx as i64);

                if accumulated >= amount {
                    break 'scan;
                }
            }
        }

        Ok((accumulated, outputs))
    }

    /// Every unspent output locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TxOutput>, BlockchainError> {
        let (unspent, spent) = self.scan_unspent(pub_key_hash)?;
        let mut utxos = Vec::new();

        for transaction in unspent {
            for (idx, output) in transaction.outputs.into_iter().enumerate() {
                if output.is_locked_with(pub_key_hash) && !is_spent(&spent, &transaction.hash_id, idx) {
                    utxos.push(output);
                }
            }
        }

        Ok(utxos)
    }

    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64, BlockchainError> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .map(|output| output.value)
            .sum())
    }

    /// Looks up a persisted transaction by its hash id
    pub fn find_transaction(&self, hash_id: &[u8]) -> Result<Transaction, BlockchainError> {
        for block in self.iterator() {
            if let Some(transaction) = block?
                .transactions
                .into_iter()
                .find(|tx| tx.hash_id == hash_id)
            {
                return Ok(transaction);
            }
        }

        Err(BlockchainError::TransactionNotFound(hex::encode(hash_id)))
    }

    /// All blocks, newest first
    pub fn blocks(&self) -> Result<Vec<Block>, BlockchainError> {
        self.iterator().collect()
    }

    /// Number of blocks in the chain
    pub fn height(&self) -> Result<usize, BlockchainError> {
        let mut height = 0;
        for block in self.iterator() {
            block?;
            height += 1;
        }
        Ok(height)
    }

    /// Validates the whole chain
    ///
    /// Walks from the tip to genesis checking each block's proof of work,
    /// transaction hashes and signatures, and that every block links to the
    /// one read before it. Blocks are not validated when the chain is opened;
    /// this is the explicit check.
    ///
    /// # Returns
    ///
    /// true if the chain is valid, false otherwise
    pub fn validate_chain(&self) -> Result<bool, BlockchainError> {
        let mut iter = self.iterator();
        let mut reached_genesis = false;

        while !iter.current_hash().is_empty() {
            let expected_hash = iter.current_hash().to_vec();
            let block = iter.next_block()?;

            if block.hash != expected_hash {
                warn!("Block {} is not linked from its child", hex::encode(&block.hash));
                return Ok(false);
            }
            if !block.validate() {
                warn!("Block {} has an invalid proof of work", hex::encode(&block.hash));
                return Ok(false);
            }

            let transactions_ok = block.transactions.iter().all(|tx| {
                tx.hash_id == tx.hash() && tx.verify(self.verifier.as_ref())
            });
            if !transactions_ok {
                warn!("Block {} holds an invalid transaction", hex::encode(&block.hash));
                return Ok(false);
            }

            reached_genesis = block.is_genesis();
        }

        Ok(reached_genesis)
    }
}

fn is_spent(spent: &OutputIndexes, tx_hash: &[u8], idx: usize) -> bool {
    spent
        .get(tx_hash)
        .map_or(false, |indexes| indexes.contains(&(idx as i64)))
}
