//! Ethereum data model and its chain variable catalog.

use alloy::primitives::{Address, Bytes, B256, U256};
use num_bigint::BigInt;

use crate::chain::{BlockData, LogData, TransactionData};
use crate::value::{Value, ValueType};
use crate::variables::VariableCatalog;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EthBlock {
    pub number: BigInt,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: BigInt,
    pub miner: Address,
    pub gas_used: BigInt,
    pub gas_limit: BigInt,
    pub difficulty: U256,
    pub extra_data: Bytes,
    pub transactions: Vec<EthTransaction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EthTransaction {
    pub hash: B256,
    pub index: BigInt,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: BigInt,
    pub gas_price: BigInt,
    pub gas_used: BigInt,
    pub nonce: BigInt,
    pub input: Bytes,
    /// Execution status taken from the receipt.
    pub success: bool,
    pub logs: Vec<EthLog>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EthLog {
    pub address: Address,
    pub index: BigInt,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub removed: bool,
}

impl BlockData for EthBlock {
    type Transaction = EthTransaction;

    fn number(&self) -> &BigInt {
        &self.number
    }

    fn hash(&self) -> B256 {
        self.hash
    }

    fn parent_hash(&self) -> B256 {
        self.parent_hash
    }

    fn transactions(&self) -> &[EthTransaction] {
        &self.transactions
    }
}

impl TransactionData for EthTransaction {
    type Log = EthLog;

    fn sender(&self) -> Address {
        self.from
    }

    fn recipient(&self) -> Option<Address> {
        self.to
    }

    fn logs(&self) -> &[EthLog] {
        &self.logs
    }
}

impl LogData for EthLog {
    fn address(&self) -> Address {
        self.address
    }

    fn topics(&self) -> &[B256] {
        &self.topics
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// The chain variables exposed to programs running against Ethereum.
///
/// Contract creations have no recipient; `transaction.to` then resolves to
/// the zero address.
pub fn catalog() -> VariableCatalog<EthBlock> {
    let mut catalog = VariableCatalog::<EthBlock>::new();

    catalog.add_block_variable("block.number", ValueType::Integer, |b| b.number.clone().into());
    catalog.add_block_variable("block.hash", ValueType::Bytes, |b| b.hash.into());
    catalog.add_block_variable("block.parentHash", ValueType::Bytes, |b| b.parent_hash.into());
    catalog.add_block_variable("block.timestamp", ValueType::Integer, |b| b.timestamp.clone().into());
    catalog.add_block_variable("block.miner", ValueType::Address, |b| b.miner.into());
    catalog.add_block_variable("block.gasUsed", ValueType::Integer, |b| b.gas_used.clone().into());
    catalog.add_block_variable("block.gasLimit", ValueType::Integer, |b| b.gas_limit.clone().into());
    catalog.add_block_variable("block.difficulty", ValueType::Integer, |b| b.difficulty.into());
    catalog.add_block_variable("block.extraData", ValueType::Bytes, |b| b.extra_data.clone().into());
    catalog.add_block_variable("block.transactionCount", ValueType::Integer, |b| {
        (b.transactions.len() as u64).into()
    });

    catalog.add_transaction_variable("transaction.hash", ValueType::Bytes, |t| t.hash.into());
    catalog.add_transaction_variable("transaction.index", ValueType::Integer, |t| t.index.clone().into());
    catalog.add_transaction_variable("transaction.from", ValueType::Address, |t| t.from.into());
    catalog.add_transaction_variable("transaction.to", ValueType::Address, |t| {
        t.to.unwrap_or_default().into()
    });
    catalog.add_transaction_variable("transaction.value", ValueType::Integer, |t| t.value.into());
    catalog.add_transaction_variable("transaction.gas", ValueType::Integer, |t| t.gas.clone().into());
    catalog.add_transaction_variable("transaction.gasPrice", ValueType::Integer, |t| {
        t.gas_price.clone().into()
    });
    catalog.add_transaction_variable("transaction.gasUsed", ValueType::Integer, |t| {
        t.gas_used.clone().into()
    });
    catalog.add_transaction_variable("transaction.nonce", ValueType::Integer, |t| t.nonce.clone().into());
    catalog.add_transaction_variable("transaction.input", ValueType::Bytes, |t| t.input.clone().into());
    catalog.add_transaction_variable("transaction.success", ValueType::Boolean, |t| t.success.into());

    catalog.add_log_entry_variable("log.address", ValueType::Address, |l| l.address.into());
    catalog.add_log_entry_variable("log.index", ValueType::Integer, |l| l.index.clone().into());
    catalog.add_log_entry_variable("log.topics", ValueType::list(ValueType::Bytes), |l| {
        Value::List(l.topics.iter().map(|topic| Value::from(*topic)).collect())
    });
    catalog.add_log_entry_variable("log.data", ValueType::Bytes, |l| l.data.clone().into());
    catalog.add_log_entry_variable("log.removed", ValueType::Boolean, |l| l.removed.into());

    catalog
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::chain::MockChainClient;
    use crate::error::ExecutionError;
    use crate::reader::DataReader;
    use crate::testing_utils::{block, log_entry, transaction};
    use crate::variables::Scope;

    #[test]
    fn scopes_nest() {
        let catalog = catalog();
        let block_scope = catalog.visible_in(Scope::Block);
        let transaction_scope = catalog.visible_in(Scope::Transaction);
        let log_scope = catalog.visible_in(Scope::LogEntry);

        assert!(block_scope.contains(&"block.number"));
        assert!(!block_scope.contains(&"transaction.from"));
        assert!(transaction_scope.contains(&"block.number"));
        assert!(transaction_scope.contains(&"transaction.from"));
        assert!(!transaction_scope.contains(&"log.address"));
        assert!(log_scope.contains(&"log.address"));
        assert!(log_scope.contains(&"transaction.hash"));
    }

    #[test]
    fn variables_resolve_against_the_cursor() {
        let catalog = catalog();
        let mut reader = DataReader::new(MockChainClient::new(), Duration::ZERO);

        assert!(matches!(
            catalog.resolve("block.number", &reader),
            Err(ExecutionError::UnsetCursor { scope: Scope::Block, .. })
        ));

        let mut tx = transaction(1, 2);
        tx.logs.push(log_entry(3, vec![B256::repeat_byte(4)]));
        let mut b = block("a", 12);
        b.transactions.push(tx.clone());
        reader.set_current_block(b);

        assert_eq!(
            catalog.resolve("block.number", &reader).unwrap(),
            Value::from(12u64)
        );
        assert_eq!(
            catalog.resolve("block.transactionCount", &reader).unwrap(),
            Value::from(1u64)
        );
        assert!(matches!(
            catalog.resolve("transaction.from", &reader),
            Err(ExecutionError::UnsetCursor { scope: Scope::Transaction, .. })
        ));

        reader.set_current_transaction(0).unwrap();
        assert_eq!(
            catalog.resolve("transaction.from", &reader).unwrap(),
            Value::Address(tx.from)
        );

        reader.set_current_log_entry(0).unwrap();
        assert_eq!(
            catalog.resolve("log.topics", &reader).unwrap(),
            Value::List(vec![B256::repeat_byte(4).into()])
        );
    }

    #[test]
    fn unknown_variables_are_undefined() {
        let reader = DataReader::new(MockChainClient::new(), Duration::ZERO);
        assert!(matches!(
            catalog().resolve("block.colour", &reader),
            Err(ExecutionError::UndefinedVariable(_))
        ));
    }
}
