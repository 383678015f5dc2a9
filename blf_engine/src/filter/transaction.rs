use tracing::trace;

use super::{handle_nested_failure, AddressFilter};
use crate::chain::{BlockData, ChainClient, TransactionData};
use crate::error::{ExecutionError, ExecutionResult};
use crate::instruction::{execute_all, Instruction, ValueAccessor};
use crate::program::ProgramState;
use crate::variables::Scope;

/// Runs nested instructions for each transaction of the current block
/// whose sender and recipient match.
pub struct TransactionFilter<C: ChainClient> {
    senders: Option<ValueAccessor<C>>,
    recipients: Option<ValueAccessor<C>>,
    instructions: Vec<Box<dyn Instruction<C>>>,
}

impl<C: ChainClient> TransactionFilter<C> {
    pub fn new(
        senders: Option<ValueAccessor<C>>,
        recipients: Option<ValueAccessor<C>>,
        instructions: Vec<Box<dyn Instruction<C>>>,
    ) -> Self {
        Self {
            senders,
            recipients,
            instructions,
        }
    }
}

impl<C: ChainClient> Instruction<C> for TransactionFilter<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let senders = AddressFilter::evaluate("transaction senders", self.senders.as_ref(), state)?;
        let recipients =
            AddressFilter::evaluate("transaction recipients", self.recipients.as_ref(), state)?;

        let matching = state
            .reader
            .current_block()
            .ok_or_else(|| ExecutionError::UnsetCursor {
                variable: "transaction filter".to_owned(),
                scope: Scope::Block,
            })?
            .transactions()
            .iter()
            .enumerate()
            .filter(|(_, tx)| senders.matches(Some(tx.sender())) && recipients.matches(tx.recipient()))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        trace!("{} matching transactions", matching.len());

        for index in matching {
            state.reader.set_current_transaction(index)?;
            let outcome = execute_all(&self.instructions, state);
            state.reader.clear_current_transaction();

            if let Err(e) = outcome {
                handle_nested_failure(state, &format!("error processing transaction {index}"), e)?;
            }
        }
        Ok(())
    }
}
