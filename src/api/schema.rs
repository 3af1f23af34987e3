use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::crypto::Address;
use crate::blockchain::transaction::{TxInput, TxOutput};
use crate::blockchain::{Block, Transaction};

/// A block as shown by the API, with hashes hex encoded
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BlockView {
    pub hash: String,
    /// Empty for the genesis block
    pub prev_hash: String,
    pub nonce: u64,
    /// Whether the stored nonce solves the proof of work
    pub is_valid: bool,
    pub transactions: Vec<TransactionView>,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        BlockView {
            hash: hex::encode(&block.hash),
            prev_hash: hex::encode(&block.prev_hash),
            nonce: block.nonce,
            is_valid: block.validate(),
            transactions: block.transactions.iter().map(TransactionView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionView {
    pub id: String,
    pub is_coinbase: bool,
    pub inputs: Vec<InputView>,
    pub outputs: Vec<OutputView>,
}

impl From<&Transaction> for TransactionView {
    fn from(transaction: &Transaction) -> Self {
        TransactionView {
            id: hex::encode(&transaction.hash_id),
            is_coinbase: transaction.is_coinbase(),
            inputs: transaction.inputs.iter().map(InputView::from).collect(),
            outputs: transaction.outputs.iter().map(OutputView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InputView {
    pub prev_tx_hash: String,
    pub out_idx: i64,
    pub signature: String,
    pub pub_key: String,
}

impl From<&TxInput> for InputView {
    fn from(input: &TxInput) -> Self {
        InputView {
            prev_tx_hash: hex::encode(&input.prev_tx_hash),
            out_idx: input.out_idx,
            signature: hex::encode(&input.signature),
            pub_key: hex::encode(&input.pub_key),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OutputView {
    pub value: u64,
    pub pub_key_hash: String,
    /// Address the output is locked to
    pub address: String,
}

impl From<&TxOutput> for OutputView {
    fn from(output: &TxOutput) -> Self {
        OutputView {
            value: output.value,
            pub_key_hash: hex::encode(&output.pub_key_hash),
            address: Address::from_pub_key_hash(&output.pub_key_hash).0,
        }
    }
}
