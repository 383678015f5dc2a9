//! Instructions handing records to the registered exporters.

use super::{EventRecord, XesAttribute, XesType, XesValue};
use crate::chain::ChainClient;
use crate::error::ExecutionResult;
use crate::instruction::{Instruction, ValueAccessor};
use crate::program::ProgramState;

/// Adds one row to a table of the tabular exporters.
pub struct AddCsvRow<C: ChainClient> {
    table: String,
    columns: Vec<(String, ValueAccessor<C>)>,
}

impl<C: ChainClient> AddCsvRow<C> {
    pub fn new(table: impl Into<String>, columns: Vec<(String, ValueAccessor<C>)>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }
}

impl<C: ChainClient> Instruction<C> for AddCsvRow<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let row = self
            .columns
            .iter()
            .map(|(column, value)| Ok((column.clone(), value.evaluate(state)?.to_string())))
            .collect::<ExecutionResult<Vec<_>>>()?;
        state.exporters.add_row(&self.table, &row);
        Ok(())
    }
}

/// Adds one line, the concatenation of its rendered parts, to the line
/// exporters.
pub struct AddLogLine<C: ChainClient> {
    parts: Vec<ValueAccessor<C>>,
}

impl<C: ChainClient> AddLogLine<C> {
    pub fn new(parts: Vec<ValueAccessor<C>>) -> Self {
        Self { parts }
    }
}

impl<C: ChainClient> Instruction<C> for AddLogLine<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let mut line = String::new();
        for part in &self.parts {
            line.push_str(&part.evaluate(state)?.to_string());
        }
        state.exporters.add_line(&line);
        Ok(())
    }
}

pub struct XesAttributeAccessor<C: ChainClient> {
    pub key: String,
    pub ty: XesType,
    pub value: ValueAccessor<C>,
}

/// Adds attributes to an event of the process-mining exporters.
pub struct AddXesEvent<C: ChainClient> {
    trace: ValueAccessor<C>,
    event: ValueAccessor<C>,
    attributes: Vec<XesAttributeAccessor<C>>,
}

impl<C: ChainClient> AddXesEvent<C> {
    pub fn new(
        trace: ValueAccessor<C>,
        event: ValueAccessor<C>,
        attributes: Vec<XesAttributeAccessor<C>>,
    ) -> Self {
        Self {
            trace,
            event,
            attributes,
        }
    }
}

impl<C: ChainClient> Instruction<C> for AddXesEvent<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let trace = self.trace.evaluate(state)?.to_string();
        let event = self.event.evaluate(state)?.to_string();
        let attributes = self
            .attributes
            .iter()
            .map(|attribute| {
                let value = attribute.value.evaluate(state)?;
                Ok(XesAttribute {
                    key: attribute.key.clone(),
                    value: XesValue::from_value(attribute.ty, &value)?,
                })
            })
            .collect::<ExecutionResult<Vec<_>>>()?;

        state.exporters.add_event(&EventRecord {
            trace,
            event,
            attributes,
        });
        Ok(())
    }
}
