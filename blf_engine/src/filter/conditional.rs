use crate::chain::ChainClient;
use crate::error::{ExecutionError, ExecutionResult};
use crate::instruction::{execute_all, Instruction, ValueAccessor};
use crate::program::ProgramState;

/// Runs nested instructions only if its predicate evaluates to `true`.
pub struct ConditionalFilter<C: ChainClient> {
    predicate: ValueAccessor<C>,
    instructions: Vec<Box<dyn Instruction<C>>>,
}

impl<C: ChainClient> ConditionalFilter<C> {
    pub fn new(predicate: ValueAccessor<C>, instructions: Vec<Box<dyn Instruction<C>>>) -> Self {
        Self {
            predicate,
            instructions,
        }
    }
}

impl<C: ChainClient> Instruction<C> for ConditionalFilter<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let holds = self.predicate.evaluate(state)?.into_boolean().map_err(|value| {
            ExecutionError::invalid_parameters(
                "condition",
                format!("expected a boolean, got {value}"),
            )
        })?;
        if holds {
            execute_all(&self.instructions, state)?;
        }
        Ok(())
    }
}
