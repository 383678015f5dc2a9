use std::collections::HashMap;

use crate::error::{ExecutionError, ExecutionResult};
use crate::value::Value;

/// Mapping from storage name to runtime value, scoped to a single program
/// run.
///
/// There is no nested scoping: whoever builds the instruction tree is
/// expected to hand out globally unique storage names.
#[derive(Clone, Debug, Default)]
pub struct ValueStore {
    values: HashMap<String, Value>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> ExecutionResult<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| ExecutionError::UndefinedVariable(name.to_owned()))
    }

    /// Creates the variable or overwrites its previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Deallocates variables injected for the duration of a nested block.
    pub fn remove_all<I>(&mut self, names: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for name in names {
            self.values.remove(name.as_ref());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
