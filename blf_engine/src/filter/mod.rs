//! Instructions iterating a data dimension and running nested instructions
//! once per matching item.

mod block;
mod conditional;
mod contract;
mod log;
mod transaction;

use std::collections::HashSet;

use alloy::primitives::Address;

pub use self::block::{BlockRangeFilter, KnownBlocks, KNOWN_BLOCKS_CAPACITY};
pub use self::conditional::ConditionalFilter;
pub use self::contract::{MemberQuery, SmartContractFilter};
pub use self::log::{LogEntryFilter, LogEntryParameter, LogEntrySignature};
pub use self::transaction::TransactionFilter;
use crate::chain::ChainClient;
use crate::error::{ExecutionError, ExecutionResult};
use crate::instruction::ValueAccessor;
use crate::program::ProgramState;
use crate::value::Value;

/// Reports a failure of nested instructions.
///
/// Returns `Ok` if the run continues, otherwise the failure wrapped in
/// [`ExecutionError::Aborted`]. A failure that is already an abort was
/// reported where it happened and is passed through.
pub(crate) fn handle_nested_failure<C: ChainClient>(
    state: &mut ProgramState<C>,
    message: &str,
    error: ExecutionError,
) -> ExecutionResult<()> {
    if error.is_abort() {
        return Err(error);
    }
    if state
        .exception_handler
        .handle_and_decide_abort(message, &error)
    {
        return Err(ExecutionError::Aborted(Box::new(error)));
    }
    Ok(())
}

/// A set of addresses to match against. An absent or empty set matches any
/// address.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AddressFilter {
    addresses: Option<HashSet<Address>>,
}

impl AddressFilter {
    pub fn any() -> Self {
        Self::default()
    }

    /// Builds the set from an operand value: no value, a single address or a
    /// list of addresses.
    pub fn from_value(method: &str, value: Option<Value>) -> ExecutionResult<Self> {
        let invalid = || {
            ExecutionError::invalid_parameters(method, "expected an address or a list of addresses")
        };
        let addresses = match value {
            None => HashSet::new(),
            Some(Value::Address(address)) => HashSet::from([address]),
            Some(Value::List(values)) => values
                .into_iter()
                .map(|value| value.into_address().map_err(|_| invalid()))
                .collect::<ExecutionResult<_>>()?,
            Some(_) => return Err(invalid()),
        };
        Ok(Self {
            addresses: (!addresses.is_empty()).then_some(addresses),
        })
    }

    /// Evaluates the optional accessor and builds the set from its value.
    pub(crate) fn evaluate<C: ChainClient>(
        method: &str,
        accessor: Option<&ValueAccessor<C>>,
        state: &mut ProgramState<C>,
    ) -> ExecutionResult<Self> {
        let value = accessor.map(|it| it.evaluate(state)).transpose()?;
        Self::from_value(method, value)
    }

    pub fn matches(&self, address: Option<Address>) -> bool {
        match &self.addresses {
            None => true,
            Some(addresses) => address.is_some_and(|address| addresses.contains(&address)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_absent_sets_match_anything() {
        for filter in [
            AddressFilter::from_value("f", None).unwrap(),
            AddressFilter::from_value("f", Some(Value::List(vec![]))).unwrap(),
        ] {
            assert!(filter.matches(Some(Address::repeat_byte(1))));
            assert!(filter.matches(None));
        }
    }

    #[test]
    fn listed_addresses_are_matched() {
        let filter = AddressFilter::from_value(
            "f",
            Some(Value::List(vec![
                Address::repeat_byte(1).into(),
                Address::repeat_byte(2).into(),
            ])),
        )
        .unwrap();
        assert!(filter.matches(Some(Address::repeat_byte(2))));
        assert!(!filter.matches(Some(Address::repeat_byte(3))));
        assert!(!filter.matches(None));

        let single = AddressFilter::from_value("f", Some(Address::repeat_byte(3).into())).unwrap();
        assert!(single.matches(Some(Address::repeat_byte(3))));
    }

    #[test]
    fn other_values_are_rejected() {
        assert!(AddressFilter::from_value("f", Some(Value::from(1u64))).is_err());
        assert!(AddressFilter::from_value("f", Some(Value::List(vec!["x".into()]))).is_err());
    }
}
