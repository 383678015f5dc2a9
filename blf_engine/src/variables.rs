//! Read-only chain-native variables (`block.number`, `transaction.from`,
//! ...) resolved against the cursor of the [`DataReader`].
//!
//! A catalog is plain data: a table from variable name to accessor. Each
//! chain integration ships its own table, see [`crate::eth::catalog`].

use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};

use crate::chain::{BlockData, ChainClient, LogOf, TransactionOf};
use crate::error::{ExecutionError, ExecutionResult};
use crate::reader::DataReader;
use crate::value::{Value, ValueType};

/// The data dimension a chain variable belongs to.
///
/// Scopes nest: a transaction scope also sees block variables, a log-entry
/// scope sees transaction and block variables.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Scope {
    Block,
    Transaction,
    LogEntry,
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Block => write!(f, "block"),
            Scope::Transaction => write!(f, "transaction"),
            Scope::LogEntry => write!(f, "log entry"),
        }
    }
}

/// Extracts a value from the item the cursor currently points at.
pub enum VariableAccessor<B: BlockData> {
    Block(fn(&B) -> Value),
    Transaction(fn(&TransactionOf<B>) -> Value),
    LogEntry(fn(&LogOf<B>) -> Value),
}

impl<B: BlockData> Clone for VariableAccessor<B> {
    fn clone(&self) -> Self {
        match self {
            Self::Block(f) => Self::Block(*f),
            Self::Transaction(f) => Self::Transaction(*f),
            Self::LogEntry(f) => Self::LogEntry(*f),
        }
    }
}

impl<B: BlockData> VariableAccessor<B> {
    pub fn scope(&self) -> Scope {
        match self {
            Self::Block(_) => Scope::Block,
            Self::Transaction(_) => Scope::Transaction,
            Self::LogEntry(_) => Scope::LogEntry,
        }
    }
}

#[derive(Clone)]
pub struct ChainVariable<B: BlockData> {
    name: String,
    value_type: ValueType,
    accessor: VariableAccessor<B>,
}

impl<B: BlockData> Debug for ChainVariable<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainVariable")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("scope", &self.scope())
            .finish()
    }
}

impl<B: BlockData> ChainVariable<B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn scope(&self) -> Scope {
        self.accessor.scope()
    }

    /// Whether the variable can be read from within `scope`.
    pub fn is_visible_in(&self, scope: Scope) -> bool {
        self.scope() <= scope
    }

    /// Reads the variable from the reader's cursor. Fails with
    /// [`ExecutionError::UnsetCursor`] if the owning cursor is not set.
    pub fn resolve<C>(&self, reader: &DataReader<C>) -> ExecutionResult<Value>
    where
        C: ChainClient<Block = B>,
    {
        let unset = || ExecutionError::UnsetCursor {
            variable: self.name.clone(),
            scope: self.scope(),
        };
        match &self.accessor {
            VariableAccessor::Block(f) => reader.current_block().map(|it| f(it)).ok_or_else(unset),
            VariableAccessor::Transaction(f) => reader
                .current_transaction()
                .map(|it| f(it))
                .ok_or_else(unset),
            VariableAccessor::LogEntry(f) => reader
                .current_log_entry()
                .map(|it| f(it))
                .ok_or_else(unset),
        }
    }
}

/// The table of chain variables available to programs for one chain.
#[derive(Clone, Debug)]
pub struct VariableCatalog<B: BlockData> {
    variables: HashMap<String, ChainVariable<B>>,
}

impl<B: BlockData> Default for VariableCatalog<B> {
    fn default() -> Self {
        Self {
            variables: HashMap::new(),
        }
    }
}

impl<B: BlockData> VariableCatalog<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block_variable(&mut self, name: &str, value_type: ValueType, f: fn(&B) -> Value) {
        self.add(name, value_type, VariableAccessor::Block(f));
    }

    pub fn add_transaction_variable(
        &mut self,
        name: &str,
        value_type: ValueType,
        f: fn(&TransactionOf<B>) -> Value,
    ) {
        self.add(name, value_type, VariableAccessor::Transaction(f));
    }

    pub fn add_log_entry_variable(
        &mut self,
        name: &str,
        value_type: ValueType,
        f: fn(&LogOf<B>) -> Value,
    ) {
        self.add(name, value_type, VariableAccessor::LogEntry(f));
    }

    fn add(&mut self, name: &str, value_type: ValueType, accessor: VariableAccessor<B>) {
        self.variables.insert(
            name.to_owned(),
            ChainVariable {
                name: name.to_owned(),
                value_type,
                accessor,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ChainVariable<B>> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Names of every variable readable from within `scope`, sorted.
    pub fn visible_in(&self, scope: Scope) -> Vec<&str> {
        let mut names = self
            .variables
            .values()
            .filter(|variable| variable.is_visible_in(scope))
            .map(ChainVariable::name)
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn resolve<C>(&self, name: &str, reader: &DataReader<C>) -> ExecutionResult<Value>
    where
        C: ChainClient<Block = B>,
    {
        self.get(name)
            .ok_or_else(|| ExecutionError::UndefinedVariable(name.to_owned()))?
            .resolve(reader)
    }
}
