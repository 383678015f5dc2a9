//! Façade over the chain client connection and the cursor into the data
//! currently being processed.

use std::fmt::{self, Debug, Formatter};
use std::thread;
use std::time::Duration;

use alloy::primitives::Address;
use num_bigint::BigInt;
use tracing::{debug, info};

use crate::chain::{BlockData, ChainClient, LogOf, TransactionData, TransactionOf};
use crate::error::{ExecutionError, ExecutionResult};
use crate::value::Value;
use crate::variables::Scope;

/// Default interval between two polls of the chain head.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Points at the block, transaction and log entry currently being processed.
///
/// Transactions and log entries are tracked by their position inside the
/// current block, so moving the cursor never clones chain data.
#[derive(Debug)]
pub struct Cursor<B: BlockData> {
    block: Option<B>,
    transaction: Option<usize>,
    log_entry: Option<usize>,
}

impl<B: BlockData> Default for Cursor<B> {
    fn default() -> Self {
        Self {
            block: None,
            transaction: None,
            log_entry: None,
        }
    }
}

/// Owns the chain client for the duration of a run and exposes the current
/// cursor.
pub struct DataReader<C: ChainClient> {
    client: Option<C>,
    poll_interval: Duration,
    cursor: Cursor<C::Block>,
}

impl<C: ChainClient> Debug for DataReader<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataReader")
            .field("closed", &self.is_closed())
            .field("poll_interval", &self.poll_interval)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl<C: ChainClient> DataReader<C> {
    pub fn new(client: C, poll_interval: Duration) -> Self {
        Self {
            client: Some(client),
            poll_interval,
            cursor: Cursor::default(),
        }
    }

    fn client(&self) -> ExecutionResult<&C> {
        self.client.as_ref().ok_or(ExecutionError::ReaderClosed)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn latest_block_number(&self) -> ExecutionResult<BigInt> {
        self.client()?
            .latest_block_number()
            .map_err(|e| ExecutionError::query("could not retrieve the latest block number", e))
    }

    pub fn block_by_number(&self, number: &BigInt) -> ExecutionResult<C::Block> {
        self.client()?
            .block_by_number(number)
            .map_err(|e| ExecutionError::query(format!("could not retrieve block {number}"), e))
    }

    pub fn query_public_member(
        &self,
        contract: &Address,
        at_block: &BigInt,
        member: &str,
        inputs: &[Value],
        output_types: &[String],
    ) -> ExecutionResult<Vec<Value>> {
        self.client()?
            .query_public_member(contract, at_block, member, inputs, output_types)
            .map_err(|e| {
                ExecutionError::query(
                    format!("could not query '{member}' of {contract} at block {at_block}"),
                    e,
                )
            })
    }

    /// Blocks until the chain head reaches `number`, polling at the
    /// configured interval. There is no timeout.
    pub fn wait_for_block(&self, number: &BigInt) -> ExecutionResult<()> {
        loop {
            let latest = self.latest_block_number()?;
            if &latest >= number {
                return Ok(());
            }
            info!("Waiting for new blocks to be mined, requested block number: {number}, latest block number: {latest}");
            thread::sleep(self.poll_interval);
        }
    }

    pub fn current_block(&self) -> Option<&C::Block> {
        self.cursor.block.as_ref()
    }

    pub fn current_transaction(&self) -> Option<&TransactionOf<C::Block>> {
        let index = self.cursor.transaction?;
        self.current_block()?.transactions().get(index)
    }

    pub fn current_log_entry(&self) -> Option<&LogOf<C::Block>> {
        let index = self.cursor.log_entry?;
        self.current_transaction()?.logs().get(index)
    }

    /// Moves the cursor to a new block, clearing the transaction and log
    /// entry cursors.
    pub fn set_current_block(&mut self, block: C::Block) {
        self.cursor = Cursor {
            block: Some(block),
            transaction: None,
            log_entry: None,
        };
    }

    pub fn clear_current_block(&mut self) {
        self.cursor = Cursor::default();
    }

    /// Points the transaction cursor at the `index`-th transaction of the
    /// current block.
    pub fn set_current_transaction(&mut self, index: usize) -> ExecutionResult<()> {
        let count = self
            .current_block()
            .map(|block| block.transactions().len())
            .ok_or_else(|| unset("transaction cursor", Scope::Block))?;
        if index >= count {
            return Err(ExecutionError::invalid_parameters(
                "transaction cursor",
                format!("index {index} out of bounds for a block of {count} transactions"),
            ));
        }
        self.cursor.transaction = Some(index);
        self.cursor.log_entry = None;
        Ok(())
    }

    pub fn clear_current_transaction(&mut self) {
        self.cursor.transaction = None;
        self.cursor.log_entry = None;
    }

    /// Points the log entry cursor at the `index`-th log entry of the
    /// current transaction.
    pub fn set_current_log_entry(&mut self, index: usize) -> ExecutionResult<()> {
        let count = self
            .current_transaction()
            .map(|transaction| transaction.logs().len())
            .ok_or_else(|| unset("log entry cursor", Scope::Transaction))?;
        if index >= count {
            return Err(ExecutionError::invalid_parameters(
                "log entry cursor",
                format!("index {index} out of bounds for a transaction of {count} log entries"),
            ));
        }
        self.cursor.log_entry = Some(index);
        Ok(())
    }

    pub fn clear_current_log_entry(&mut self) {
        self.cursor.log_entry = None;
    }

    /// Releases the chain client. Further queries fail with
    /// [`ExecutionError::ReaderClosed`].
    pub fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("closed the chain client connection");
        }
        self.cursor = Cursor::default();
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }
}

fn unset(variable: &str, scope: Scope) -> ExecutionError {
    ExecutionError::UnsetCursor {
        variable: variable.to_owned(),
        scope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::testing_utils::{block, transaction};

    #[test]
    fn clearing_the_transaction_also_clears_the_log_entry() {
        let mut reader = DataReader::new(MockChainClient::new(), Duration::ZERO);
        let mut tx = transaction(1, 2);
        tx.logs.push(crate::testing_utils::log_entry(9, vec![]));
        let mut b = block("a", 5);
        b.transactions.push(tx);

        reader.set_current_block(b);
        reader.set_current_transaction(0).unwrap();
        reader.set_current_log_entry(0).unwrap();
        assert!(reader.current_log_entry().is_some());

        reader.clear_current_transaction();
        assert!(reader.current_transaction().is_none());
        assert!(reader.current_log_entry().is_none());
        assert!(reader.current_block().is_some());
    }

    #[test]
    fn cursor_positions_are_bounds_checked() {
        let mut reader = DataReader::new(MockChainClient::new(), Duration::ZERO);
        assert!(matches!(
            reader.set_current_transaction(0),
            Err(ExecutionError::UnsetCursor { .. })
        ));
        reader.set_current_block(block("a", 1));
        assert!(matches!(
            reader.set_current_transaction(0),
            Err(ExecutionError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn waits_until_the_chain_reaches_the_block() {
        let mut client = MockChainClient::new();
        let mut head = 7u64;
        client.expect_latest_block_number().times(4).returning(move || {
            head += 1;
            Ok(BigInt::from(head))
        });
        let reader = DataReader::new(client, Duration::ZERO);

        reader.wait_for_block(&BigInt::from(11)).unwrap();
    }

    #[test]
    fn closed_reader_rejects_queries() {
        let mut reader = DataReader::new(MockChainClient::new(), Duration::ZERO);
        reader.close();
        assert!(reader.is_closed());
        assert!(matches!(
            reader.latest_block_number(),
            Err(ExecutionError::ReaderClosed)
        ));
    }

    #[test]
    fn client_failures_become_query_errors() {
        let mut client = MockChainClient::new();
        client
            .expect_block_by_number()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        let reader = DataReader::new(client, Duration::ZERO);

        let err = reader.block_by_number(&BigInt::from(3)).unwrap_err();
        assert!(matches!(err, ExecutionError::Query { .. }));
        assert_eq!(err.to_string(), "query failed: could not retrieve block 3");
    }
}
