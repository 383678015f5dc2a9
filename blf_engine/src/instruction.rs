//! The executable nodes of an instruction tree: method calls, variable
//! assignments and the value accessors they are built from.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::chain::ChainClient;
use crate::error::ExecutionResult;
use crate::library::Method;
use crate::program::ProgramState;
use crate::value::Value;

/// A node of the compiled instruction tree.
pub trait Instruction<C: ChainClient> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()>;
}

/// Executes `instructions` in order, stopping at the first failure.
pub fn execute_all<C: ChainClient>(
    instructions: &[Box<dyn Instruction<C>>],
    state: &mut ProgramState<C>,
) -> ExecutionResult<()> {
    instructions
        .iter()
        .try_for_each(|instruction| instruction.execute(state))
}

/// Produces a value from the current program state.
pub enum ValueAccessor<C: ChainClient> {
    Literal(Value),
    /// A variable of the value store.
    Variable(String),
    /// A chain-native variable read at the cursor.
    Chain(String),
    /// The result of a nested method call.
    Call(Box<MethodCall<C>>),
    /// Evaluates every element in order.
    List(Vec<ValueAccessor<C>>),
}

impl<C: ChainClient> Debug for ValueAccessor<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Variable(name) => f.debug_tuple("Variable").field(name).finish(),
            Self::Chain(name) => f.debug_tuple("Chain").field(name).finish(),
            Self::Call(call) => f.debug_tuple("Call").field(call).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
        }
    }
}

impl<C: ChainClient> ValueAccessor<C> {
    pub fn evaluate(&self, state: &mut ProgramState<C>) -> ExecutionResult<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Variable(name) => state.values.get(name).cloned(),
            Self::Chain(name) => state.resolve_chain_variable(name),
            Self::Call(call) => call.call(state),
            Self::List(items) => items
                .iter()
                .map(|item| item.evaluate(state))
                .collect::<ExecutionResult<Vec<_>>>()
                .map(Value::List),
        }
    }
}

/// Writes a value into the value store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValueMutator {
    name: String,
}

impl ValueMutator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set<C: ChainClient>(&self, value: Value, state: &mut ProgramState<C>) {
        state.values.set(self.name.clone(), value);
    }
}

/// Invokes a resolved library method and optionally stores its result.
pub struct MethodCall<C: ChainClient> {
    method: Arc<Method<C>>,
    parameters: Vec<ValueAccessor<C>>,
    result: Option<ValueMutator>,
}

impl<C: ChainClient> Debug for MethodCall<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCall")
            .field("method", self.method.signature())
            .field("parameters", &self.parameters)
            .field("result", &self.result)
            .finish()
    }
}

impl<C: ChainClient> MethodCall<C> {
    pub fn new(
        method: Arc<Method<C>>,
        parameters: Vec<ValueAccessor<C>>,
        result: Option<ValueMutator>,
    ) -> Self {
        Self {
            method,
            parameters,
            result,
        }
    }

    pub fn method(&self) -> &Method<C> {
        &self.method
    }

    /// Evaluates the parameters in declaration order and invokes the method.
    /// The result is returned, and stored if a mutator is attached.
    pub fn call(&self, state: &mut ProgramState<C>) -> ExecutionResult<Value> {
        let parameters = self
            .parameters
            .iter()
            .map(|parameter| parameter.evaluate(state))
            .collect::<ExecutionResult<Vec<_>>>()?;
        let value = self.method.invoke(&parameters, state)?;
        if let Some(result) = &self.result {
            result.set(value.clone(), state);
        }
        Ok(value)
    }
}

impl<C: ChainClient> Instruction<C> for MethodCall<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        self.call(state).map(drop)
    }
}

#[derive(Debug)]
pub struct VariableAssignment<C: ChainClient> {
    target: ValueMutator,
    value: ValueAccessor<C>,
}

impl<C: ChainClient> VariableAssignment<C> {
    pub fn new(name: impl Into<String>, value: ValueAccessor<C>) -> Self {
        Self {
            target: ValueMutator::new(name),
            value,
        }
    }
}

impl<C: ChainClient> Instruction<C> for VariableAssignment<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let value = self.value.evaluate(state)?;
        self.target.set(value, state);
        Ok(())
    }
}
