use crate::chain::{BlockData, ChainClient};
use crate::error::{ExecutionError, ExecutionResult};
use crate::instruction::{execute_all, Instruction, ValueAccessor};
use crate::program::ProgramState;
use crate::value::Value;
use crate::variables::Scope;

/// A read of a public contract member, e.g. `balanceOf(address)`, whose
/// results are stored under the given variable names.
pub struct MemberQuery<C: ChainClient> {
    member: String,
    inputs: Vec<ValueAccessor<C>>,
    /// Variable name and Solidity type of each returned value.
    outputs: Vec<(String, String)>,
}

impl<C: ChainClient> MemberQuery<C> {
    pub fn new(
        member: impl Into<String>,
        inputs: Vec<ValueAccessor<C>>,
        outputs: Vec<(String, String)>,
    ) -> Self {
        Self {
            member: member.into(),
            inputs,
            outputs,
        }
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(name, _)| name.as_str())
    }
}

/// Reads contract state as of the current block and runs nested
/// instructions with the results in scope.
pub struct SmartContractFilter<C: ChainClient> {
    contract: ValueAccessor<C>,
    queries: Vec<MemberQuery<C>>,
    instructions: Vec<Box<dyn Instruction<C>>>,
}

impl<C: ChainClient> SmartContractFilter<C> {
    pub fn new(
        contract: ValueAccessor<C>,
        queries: Vec<MemberQuery<C>>,
        instructions: Vec<Box<dyn Instruction<C>>>,
    ) -> Self {
        Self {
            contract,
            queries,
            instructions,
        }
    }

    fn query_and_execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let contract = self.contract.evaluate(state)?.into_address().map_err(|value| {
            ExecutionError::invalid_parameters("smart contract", format!("expected an address, got {value}"))
        })?;
        let block = state
            .reader
            .current_block()
            .map(|block| block.number().clone())
            .ok_or_else(|| ExecutionError::UnsetCursor {
                variable: "smart contract filter".to_owned(),
                scope: Scope::Block,
            })?;

        for query in &self.queries {
            let inputs = query
                .inputs
                .iter()
                .map(|input| input.evaluate(state))
                .collect::<ExecutionResult<Vec<Value>>>()?;
            let output_types = query
                .outputs
                .iter()
                .map(|(_, ty)| ty.clone())
                .collect::<Vec<_>>();

            let values = state.reader.query_public_member(
                &contract,
                &block,
                &query.member,
                &inputs,
                &output_types,
            )?;
            if values.len() != query.outputs.len() {
                return Err(ExecutionError::invalid_parameters(
                    &query.member,
                    format!(
                        "expected {} return values, got {}",
                        query.outputs.len(),
                        values.len()
                    ),
                ));
            }
            for ((name, _), value) in query.outputs.iter().zip(values) {
                state.values.set(name.clone(), value);
            }
        }

        execute_all(&self.instructions, state)
    }
}

impl<C: ChainClient> Instruction<C> for SmartContractFilter<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let outcome = self.query_and_execute(state);
        state
            .values
            .remove_all(self.queries.iter().flat_map(MemberQuery::output_names));
        outcome
    }
}
