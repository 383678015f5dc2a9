//! Conversion of alloy RPC types into the engine's Ethereum data model.

use std::collections::HashMap;

use alloy::primitives::B256;
use alloy::rpc::types::{Block, Log, Transaction, TransactionReceipt};
use anyhow::Context as _;
use blf_engine::eth::{EthBlock, EthLog, EthTransaction};
use num_bigint::BigInt;

/// The parts of a transaction receipt the data model keeps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub success: bool,
    pub gas_used: BigInt,
    pub logs: Vec<EthLog>,
}

impl From<&TransactionReceipt> for ReceiptSummary {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            success: receipt.status(),
            gas_used: BigInt::from(receipt.gas_used),
            logs: receipt.inner.logs().iter().map(eth_log).collect(),
        }
    }
}

pub fn eth_log(log: &Log) -> EthLog {
    EthLog {
        address: log.address(),
        index: BigInt::from(log.log_index.unwrap_or_default()),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        removed: log.removed,
    }
}

pub fn eth_transaction(tx: &Transaction, receipt: ReceiptSummary) -> EthTransaction {
    EthTransaction {
        hash: tx.hash,
        index: BigInt::from(tx.transaction_index.unwrap_or_default()),
        from: tx.from,
        to: tx.to,
        value: tx.value,
        gas: BigInt::from(tx.gas),
        gas_price: BigInt::from(tx.gas_price.unwrap_or_default()),
        gas_used: receipt.gas_used,
        nonce: BigInt::from(tx.nonce),
        input: tx.input.clone(),
        success: receipt.success,
        logs: receipt.logs,
    }
}

/// Joins a block fetched with full transactions with the receipts of those
/// transactions. Every transaction must have a receipt.
pub fn eth_block(block: &Block, receipts: &[TransactionReceipt]) -> anyhow::Result<EthBlock> {
    let mut receipts = receipts
        .iter()
        .map(|receipt| (receipt.transaction_hash, ReceiptSummary::from(receipt)))
        .collect::<HashMap<B256, _>>();

    let transactions = block
        .transactions
        .as_transactions()
        .unwrap_or_default()
        .iter()
        .map(|tx| {
            let receipt = receipts
                .remove(&tx.hash)
                .with_context(|| format!("missing receipt for transaction {}", tx.hash))?;
            Ok(eth_transaction(tx, receipt))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let header = &block.header;
    Ok(EthBlock {
        number: BigInt::from(header.number),
        hash: header.hash,
        parent_hash: header.parent_hash,
        timestamp: BigInt::from(header.timestamp),
        miner: header.miner,
        gas_used: BigInt::from(header.gas_used),
        gas_limit: BigInt::from(header.gas_limit),
        difficulty: header.difficulty,
        extra_data: header.extra_data.clone(),
        transactions,
    })
}
