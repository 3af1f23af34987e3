use log::debug;
use num_bigint::BigUint;

use super::block::Block;
use super::encoding::sha256;

/// Number of leading zero bits a block hash must have
pub const DIFFICULTY: u32 = 12;

/// Width of the digest space in bits
pub const HASH_BITS: u32 = 256;

/// Numeric threshold a digest must stay strictly below: `1 << (HASH_BITS - DIFFICULTY)`
pub fn target() -> BigUint {
    BigUint::from(1u8) << ((HASH_BITS - DIFFICULTY) as usize)
}

/// Proof-of-work puzzle for a single block.
///
/// The digest preimage is `prev_hash || transactions_digest || nonce || difficulty`,
/// with the nonce and difficulty each written as 8 big-endian bytes.
pub struct ProofOfWork<'a> {
    block: &'a Block,
    transactions_digest: Vec<u8>,
    target: BigUint,
}

impl<'a> ProofOfWork<'a> {
    pub fn new(block: &'a Block) -> Self {
        ProofOfWork {
            block,
            transactions_digest: block.hash_transactions(),
            target: target(),
        }
    }

    fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.block.prev_hash.len() + self.transactions_digest.len() + 16);
        data.extend_from_slice(&self.block.prev_hash);
        data.extend_from_slice(&self.transactions_digest);
        data.extend_from_slice(&nonce.to_be_bytes());
        data.extend_from_slice(&u64::from(DIFFICULTY).to_be_bytes());
        data
    }

    fn digest(&self, nonce: u64) -> Vec<u8> {
        sha256(&self.prepare_data(nonce))
    }

    fn meets_target(&self, digest: &[u8]) -> bool {
        BigUint::from_bytes_be(digest) < self.target
    }

    /// Searches nonces from 0 upward until the digest falls below the target.
    ///
    /// Blocks the calling thread until a solution is found.
    pub fn run(&self) -> (u64, Vec<u8>) {
        let mut nonce: u64 = 0;

        loop {
            let hash = self.digest(nonce);
            if self.meets_target(&hash) {
                debug!("Solved proof of work: nonce {} hash {}", nonce, hex::encode(&hash));
                return (nonce, hash);
            }
            nonce += 1;
        }
    }

    /// Recomputes the digest for the block's stored nonce and checks that it
    /// both solves the puzzle and matches the stored hash
    pub fn validate(&self) -> bool {
        let hash = self.digest(self.block.nonce);
        hash == self.block.hash && self.meets_target(&hash)
    }
}
