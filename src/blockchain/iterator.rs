use super::block::Block;
use super::chain::BlockchainError;
use super::storage::ChainStore;

/// Cursor that walks the persisted chain from a starting hash back to genesis.
///
/// Callers can stop either on `EndOfChain` from [`ChainIterator::next_block`]
/// or by checking [`Block::is_genesis`] on the returned block. Used as a std
/// [`Iterator`], the walk simply ends after the genesis block.
pub struct ChainIterator<'a> {
    current_hash: Vec<u8>,
    store: &'a ChainStore,
}

impl<'a> ChainIterator<'a> {
    pub fn new(store: &'a ChainStore, start: Vec<u8>) -> Self {
        ChainIterator {
            current_hash: start,
            store,
        }
    }

    /// Hash of the block the next call will return; empty past genesis
    pub fn current_hash(&self) -> &[u8] {
        &self.current_hash
    }

    /// Returns the block at the cursor and moves the cursor to its parent
    pub fn next_block(&mut self) -> Result<Block, BlockchainError> {
        if self.current_hash.is_empty() {
            return Err(BlockchainError::EndOfChain);
        }

        match self.store.get_block(&self.current_hash) {
            Ok(block) => {
                self.current_hash = block.prev_hash.clone();
                Ok(block)
            }
            Err(err) => {
                // A broken link cannot be walked past
                self.current_hash.clear();
                Err(err.into())
            }
        }
    }
}

impl Iterator for ChainIterator<'_> {
    type Item = Result<Block, BlockchainError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_block() {
            Err(BlockchainError::EndOfChain) => None,
            other => Some(other),
        }
    }
}
