use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::chain::{Blockchain, BlockchainError};
use super::crypto::{hash_pub_key, CryptoError, KeyPair, SignatureVerifier};
use super::encoding::put_field;

/// Value created by a coinbase transaction
pub const COINBASE_REWARD: u64 = 100;

/// Output index carried by the single input of a coinbase transaction
pub const COINBASE_OUT_IDX: i64 = -1;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Reference to an output of an earlier transaction, plus the proof that the
/// spender owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction whose output is spent; empty for coinbase
    pub prev_tx_hash: Vec<u8>,

    /// Index of the spent output; -1 for coinbase
    pub out_idx: i64,

    /// Signature over the trimmed transaction, or free-form data for coinbase
    pub signature: Vec<u8>,

    /// Raw public key of the spender; empty for coinbase
    pub pub_key: Vec<u8>,
}

impl TxInput {
    /// True if this input was signed with the key behind `pub_key_hash`
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(&self.pub_key) == pub_key_hash
    }
}

/// An amount locked to the hash of a public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: &[u8]) -> Self {
        TxOutput {
            value,
            pub_key_hash: pub_key_hash.to_vec(),
        }
    }

    pub fn is_locked_with(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }
}

/// A value transfer: inputs spend earlier outputs, outputs lock new value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash of the transaction (all fields except itself)
    pub hash_id: Vec<u8>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Creates a coinbase transaction paying the fixed reward to `recipient`
    ///
    /// # Arguments
    ///
    /// * `recipient` - Public key hash of the receiver
    /// * `data` - Arbitrary payload stored in place of a signature; a default
    ///   message naming the recipient is used when empty
    ///
    /// # Returns
    ///
    /// A new Transaction with its hash id set
    pub fn new_coinbase(recipient: &[u8], data: &str) -> Self {
        let data = if data.is_empty() {
            format!("Coins to {}", hex::encode(recipient))
        } else {
            data.to_string()
        };

        let input = TxInput {
            prev_tx_hash: Vec::new(),
            out_idx: COINBASE_OUT_IDX,
            signature: data.into_bytes(),
            pub_key: Vec::new(),
        };

        let mut transaction = Transaction {
            hash_id: Vec::new(),
            inputs: vec![input],
            outputs: vec![TxOutput::new(COINBASE_REWARD, recipient)],
        };
        transaction.set_hash_id();
        transaction
    }

    /// Creates a signed transfer of `amount` from `sender` to `recipient`
    ///
    /// Spendable outputs of the sender are collected from the chain until
    /// they cover `amount`; any excess is returned to the sender as a second
    /// "change" output.
    ///
    /// # Arguments
    ///
    /// * `sender` - The key that owns the spent outputs and signs the inputs
    /// * `recipient` - Public key hash of the receiver
    /// * `amount` - The amount to transfer
    /// * `chain` - The chain to collect spendable outputs from
    ///
    /// # Returns
    ///
    /// The signed transaction, or `InsufficientFunds` if the sender's
    /// spendable outputs fall short
    pub fn new_transfer(
        sender: &dyn KeyPair,
        recipient: &[u8],
        amount: u64,
        chain: &Blockchain,
    ) -> Result<Self, BlockchainError> {
        if amount == 0 {
            return Err(TransactionError::InvalidAmount("Amount must be positive".to_string()).into());
        }

        let sender_pub_key = sender.public_key();
        let sender_hash = hash_pub_key(&sender_pub_key);

        let (accumulated, spendable) = chain.find_spendable_outputs(&sender_hash, amount)?;
        if accumulated < amount {
            return Err(TransactionError::InsufficientFunds {
                required: amount,
                available: accumulated,
            }
            .into());
        }

        let mut inputs = Vec::new();
        for (prev_tx_hash, out_idxs) in spendable {
            for out_idx in out_idxs {
                inputs.push(TxInput {
                    prev_tx_hash: prev_tx_hash.clone(),
                    out_idx,
                    signature: Vec::new(),
                    pub_key: sender_pub_key.clone(),
                });
            }
        }

        let mut outputs = vec![TxOutput::new(amount, recipient)];
        if accumulated > amount {
            outputs.push(TxOutput::new(accumulated - amount, &sender_hash));
        }

        let mut transaction = Transaction {
            hash_id: Vec::new(),
            inputs,
            outputs,
        };
        transaction.sign(sender)?;
        transaction.set_hash_id();

        Ok(transaction)
    }

    /// Content hash over every field except `hash_id`
    pub fn hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();

        hasher.update((self.inputs.len() as u64).to_be_bytes());
        for input in &self.inputs {
            put_field(&mut hasher, &input.prev_tx_hash);
            hasher.update(input.out_idx.to_be_bytes());
            put_field(&mut hasher, &input.signature);
            put_field(&mut hasher, &input.pub_key);
        }

        hasher.update((self.outputs.len() as u64).to_be_bytes());
        for output in &self.outputs {
            hasher.update(output.value.to_be_bytes());
            put_field(&mut hasher, &output.pub_key_hash);
        }

        hasher.finalize().to_vec()
    }

    /// Recomputes and stores the content hash
    pub fn set_hash_id(&mut self) {
        self.hash_id = self.hash();
    }

    /// A coinbase has exactly one input, with no previous transaction and
    /// output index -1
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_hash.is_empty()
            && self.inputs[0].out_idx == COINBASE_OUT_IDX
    }

    /// Copy with every signature and public key stripped; its hash id is the
    /// message that gets signed and verified
    pub fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                prev_tx_hash: input.prev_tx_hash.clone(),
                out_idx: input.out_idx,
                signature: Vec::new(),
                pub_key: Vec::new(),
            })
            .collect();

        let mut copy = Transaction {
            hash_id: Vec::new(),
            inputs,
            outputs: self.outputs.clone(),
        };
        copy.set_hash_id();
        copy
    }

    /// Signs every input with `key`. Coinbase transactions are left untouched.
    pub fn sign(&mut self, key: &dyn KeyPair) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Ok(());
        }

        let message = self.trimmed_copy().hash_id;
        for input in &mut self.inputs {
            input.signature = key.sign(&message)?;
        }

        Ok(())
    }

    /// Checks every input's signature against its public key over the
    /// trimmed copy. Always true for coinbase.
    pub fn verify(&self, verifier: &dyn SignatureVerifier) -> bool {
        if self.is_coinbase() {
            return true;
        }

        let message = self.trimmed_copy().hash_id;
        self.inputs
            .iter()
            .all(|input| verifier.verify(&input.pub_key, &message, &input.signature))
    }

    /// Sum of all output values, or `None` if it does not fit in a u64
    pub fn output_total(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{Ed25519Verifier, Wallet};

    fn signed_transfer(sender: &Wallet, recipient: &Wallet) -> Transaction {
        let mut transaction = Transaction {
            hash_id: Vec::new(),
            inputs: vec![
                TxInput {
                    prev_tx_hash: vec![1u8; 32],
                    out_idx: 0,
                    signature: Vec::new(),
                    pub_key: sender.public_key(),
                },
                TxInput {
                    prev_tx_hash: vec![2u8; 32],
                    out_idx: 1,
                    signature: Vec::new(),
                    pub_key: sender.public_key(),
                },
            ],
            outputs: vec![
                TxOutput::new(30, &recipient.pub_key_hash()),
                TxOutput::new(70, &sender.pub_key_hash()),
            ],
        };
        transaction.sign(sender).unwrap();
        transaction.set_hash_id();
        transaction
    }

    #[test]
    fn test_coinbase_transaction() {
        let miner = Wallet::new();
        let transaction = Transaction::new_coinbase(&miner.pub_key_hash(), "");

        assert!(transaction.is_coinbase());
        assert_eq!(transaction.outputs.len(), 1);
        assert_eq!(transaction.outputs[0].value, COINBASE_REWARD);
        assert!(transaction.outputs[0].is_locked_with(&miner.pub_key_hash()));
        assert_eq!(transaction.hash_id, transaction.hash());
        assert!(transaction.verify(&Ed25519Verifier));
    }

    #[test]
    fn test_coinbase_data_changes_hash() {
        let recipient = [5u8; 20];
        let first = Transaction::new_coinbase(&recipient, "one");
        let second = Transaction::new_coinbase(&recipient, "two");

        assert_ne!(first.hash_id, second.hash_id);
    }

    #[test]
    fn test_is_coinbase_identity() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        assert!(!signed_transfer(&sender, &recipient).is_coinbase());

        let mut two_inputs = Transaction::new_coinbase(&[1u8; 20], "x");
        two_inputs.inputs.push(two_inputs.inputs[0].clone());
        assert!(!two_inputs.is_coinbase());

        let mut real_reference = Transaction::new_coinbase(&[1u8; 20], "x");
        real_reference.inputs[0].prev_tx_hash = vec![4u8; 32];
        assert!(!real_reference.is_coinbase());

        let mut real_index = Transaction::new_coinbase(&[1u8; 20], "x");
        real_index.inputs[0].out_idx = 0;
        assert!(!real_index.is_coinbase());
    }

    #[test]
    fn test_trimmed_copy_strips_signatures() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let transaction = signed_transfer(&sender, &recipient);
        let trimmed = transaction.trimmed_copy();

        assert!(trimmed
            .inputs
            .iter()
            .all(|input| input.signature.is_empty() && input.pub_key.is_empty()));
        assert_eq!(trimmed.outputs, transaction.outputs);
        assert_eq!(trimmed.hash_id, trimmed.hash());
    }

    #[test]
    fn test_sign_and_verify() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let transaction = signed_transfer(&sender, &recipient);

        assert!(transaction.inputs.iter().all(|input| !input.signature.is_empty()));
        assert!(transaction.verify(&Ed25519Verifier));
    }

    #[test]
    fn test_verify_fails_after_tampering() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let original = signed_transfer(&sender, &recipient);

        let mut output_changed = original.clone();
        output_changed.outputs[0].value += 1;
        assert!(!output_changed.verify(&Ed25519Verifier));

        let mut lock_changed = original.clone();
        lock_changed.outputs[1].pub_key_hash[0] ^= 0x01;
        assert!(!lock_changed.verify(&Ed25519Verifier));

        let mut index_changed = original.clone();
        index_changed.inputs[1].out_idx = 2;
        assert!(!index_changed.verify(&Ed25519Verifier));

        let mut signature_changed = original.clone();
        signature_changed.inputs[0].signature[0] ^= 0x01;
        assert!(!signature_changed.verify(&Ed25519Verifier));
    }

    #[test]
    fn test_verify_fails_with_foreign_key() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let mut transaction = signed_transfer(&sender, &recipient);

        // Signed by the recipient while claiming the sender's key
        transaction.sign(&recipient).unwrap();
        assert!(!transaction.verify(&Ed25519Verifier));
    }

    #[test]
    fn test_sign_coinbase_is_noop() {
        let signer = Wallet::new();
        let mut transaction = Transaction::new_coinbase(&[3u8; 20], "reward");
        let before = transaction.clone();

        transaction.sign(&signer).unwrap();
        assert_eq!(transaction, before);
    }

    #[test]
    fn test_uses_key() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let transaction = signed_transfer(&sender, &recipient);

        assert!(transaction.inputs[0].uses_key(&sender.pub_key_hash()));
        assert!(!transaction.inputs[0].uses_key(&recipient.pub_key_hash()));
        assert_eq!(transaction.output_total(), Some(100));
    }

    #[test]
    fn test_output_total_overflow() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let mut transaction = signed_transfer(&sender, &recipient);
        transaction.outputs[0].value = u64::MAX;

        assert_eq!(transaction.output_total(), None);
    }
}
