//! The capabilities the engine needs from a target chain.
//!
//! A chain integration provides a [`ChainClient`] and the block, transaction
//! and log-entry types it returns. Everything else in the engine is generic
//! over these traits.

use std::fmt::Debug;

use alloy::primitives::{Address, B256};
#[cfg(test)]
use mockall::automock;
use num_bigint::BigInt;

#[cfg(test)]
use crate::eth::EthBlock;
use crate::value::Value;

/// Transactions carried by blocks of type `B`.
pub type TransactionOf<B> = <B as BlockData>::Transaction;

/// Log entries carried by transactions of blocks of type `B`.
pub type LogOf<B> = <TransactionOf<B> as TransactionData>::Log;

/// Query interface of a chain node.
///
/// Implementations are expected to block until the node answers; the engine
/// never issues concurrent queries against a client.
#[cfg_attr(test, automock(type Block = EthBlock;))]
pub trait ChainClient {
    type Block: BlockData;

    /// Number of the most recent block known to the node.
    fn latest_block_number(&self) -> anyhow::Result<BigInt>;

    /// Retrieves a block together with its transactions and their log
    /// entries.
    fn block_by_number(&self, number: &BigInt) -> anyhow::Result<Self::Block>;

    /// Reads public state of a smart contract as of `at_block`. The
    /// `output_types` are the contract's declared return types, e.g.
    /// `uint256`.
    fn query_public_member(
        &self,
        contract: &Address,
        at_block: &BigInt,
        member: &str,
        inputs: &[Value],
        output_types: &[String],
    ) -> anyhow::Result<Vec<Value>>;
}

pub trait BlockData: Clone + Debug + 'static {
    type Transaction: TransactionData;

    fn number(&self) -> &BigInt;

    fn hash(&self) -> B256;

    fn parent_hash(&self) -> B256;

    fn transactions(&self) -> &[Self::Transaction];
}

pub trait TransactionData: Clone + Debug + 'static {
    type Log: LogData;

    fn sender(&self) -> Address;

    /// `None` for contract creations.
    fn recipient(&self) -> Option<Address>;

    fn logs(&self) -> &[Self::Log];
}

pub trait LogData: Clone + Debug + 'static {
    /// The contract that emitted the entry.
    fn address(&self) -> Address;

    /// Topic 0 is the event signature hash for non-anonymous events.
    fn topics(&self) -> &[B256];

    fn data(&self) -> &[u8];
}
