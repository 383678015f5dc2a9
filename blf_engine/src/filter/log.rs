use alloy::dyn_abi::DynSolType;
use alloy::primitives::{keccak256, Bytes, B256};
use tracing::trace;

use super::{handle_nested_failure, AddressFilter};
use crate::abi::{parse_type, value_from_sol, value_type_of};
use crate::chain::{ChainClient, LogData, TransactionData};
use crate::error::{ExecutionError, ExecutionResult};
use crate::instruction::{execute_all, Instruction, ValueAccessor};
use crate::program::ProgramState;
use crate::value::{Value, ValueType};
use crate::variables::Scope;

/// A parameter of an event declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntryParameter {
    name: String,
    solidity_type: String,
    indexed: bool,
    ty: DynSolType,
}

impl LogEntryParameter {
    pub fn new(name: impl Into<String>, solidity_type: &str, indexed: bool) -> ExecutionResult<Self> {
        Ok(Self {
            name: name.into(),
            solidity_type: solidity_type.to_owned(),
            indexed,
            ty: parse_type(solidity_type)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn solidity_type(&self) -> &str {
        &self.solidity_type
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// The type of the decoded value.
    pub fn value_type(&self) -> ValueType {
        if self.indexed && !is_word(&self.ty) {
            ValueType::Bytes
        } else {
            value_type_of(&self.ty)
        }
    }

    /// Decodes the value of an indexed parameter. Topics of reference types
    /// only hold the hash of the value, which is returned as bytes.
    fn decode_topic(&self, topic: &B256) -> ExecutionResult<Value> {
        if !is_word(&self.ty) {
            return Ok(Value::Bytes(Bytes::copy_from_slice(topic.as_slice())));
        }
        self.ty
            .abi_decode(topic.as_slice())
            .map(value_from_sol)
            .map_err(|e| ExecutionError::decode(&self.name, e))
    }
}

/// Whether values of `ty` are stored in topics as is rather than hashed.
fn is_word(ty: &DynSolType) -> bool {
    matches!(
        ty,
        DynSolType::Bool
            | DynSolType::Int(_)
            | DynSolType::Uint(_)
            | DynSolType::Address
            | DynSolType::FixedBytes(_)
            | DynSolType::Function
    )
}

/// An event declaration: `Name(type indexed a, type b)`.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntrySignature {
    name: String,
    parameters: Vec<LogEntryParameter>,
    topic: B256,
}

impl LogEntrySignature {
    pub fn new(name: impl Into<String>, parameters: Vec<LogEntryParameter>) -> Self {
        let name = name.into();
        let canonical = format!(
            "{name}({})",
            parameters
                .iter()
                .map(|p| p.ty.sol_type_name().into_owned())
                .collect::<Vec<_>>()
                .join(",")
        );
        Self {
            topic: keccak256(canonical.as_bytes()),
            name,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[LogEntryParameter] {
        &self.parameters
    }

    /// The hash identifying the event in the first topic of its log entries.
    pub fn topic(&self) -> B256 {
        self.topic
    }

    pub fn matches(&self, topics: &[B256]) -> bool {
        topics.first() == Some(&self.topic)
    }

    /// Decodes the parameters of a matching log entry, in declaration order.
    pub fn decode(&self, topics: &[B256], data: &[u8]) -> ExecutionResult<Vec<(String, Value)>> {
        let indexed = self.parameters.iter().filter(|p| p.indexed).count();
        if topics.len() != indexed + 1 {
            return Err(ExecutionError::decode(
                &self.name,
                format!(
                    "expected {} topics for {indexed} indexed parameters, found {}",
                    indexed + 1,
                    topics.len()
                ),
            ));
        }

        let body = DynSolType::Tuple(
            self.parameters
                .iter()
                .filter(|p| !p.indexed)
                .map(|p| p.ty.clone())
                .collect(),
        );
        let mut body_values = match body.abi_decode_sequence(data) {
            Ok(decoded) => decoded
                .as_tuple()
                .map(<[_]>::to_vec)
                .unwrap_or_default()
                .into_iter(),
            Err(e) => return Err(ExecutionError::decode(&self.name, e)),
        };
        let mut topic_values = topics[1..].iter();

        self.parameters
            .iter()
            .map(|parameter| {
                let value = if parameter.indexed {
                    topic_values
                        .next()
                        .ok_or_else(|| ExecutionError::decode(&self.name, "missing topic"))
                        .and_then(|topic| parameter.decode_topic(topic))?
                } else {
                    body_values
                        .next()
                        .map(value_from_sol)
                        .ok_or_else(|| ExecutionError::decode(&self.name, "missing data"))?
                };
                Ok((parameter.name.clone(), value))
            })
            .collect()
    }
}

/// Runs nested instructions for each log entry of the current transaction
/// matching an event signature, with the decoded parameters stored under
/// their declared names.
pub struct LogEntryFilter<C: ChainClient> {
    signature: LogEntrySignature,
    addresses: Option<ValueAccessor<C>>,
    instructions: Vec<Box<dyn Instruction<C>>>,
}

impl<C: ChainClient> LogEntryFilter<C> {
    pub fn new(
        signature: LogEntrySignature,
        addresses: Option<ValueAccessor<C>>,
        instructions: Vec<Box<dyn Instruction<C>>>,
    ) -> Self {
        Self {
            signature,
            addresses,
            instructions,
        }
    }

    fn process_log_entry(
        &self,
        index: usize,
        state: &mut ProgramState<C>,
    ) -> ExecutionResult<()> {
        state.reader.set_current_log_entry(index)?;
        let decoded = state
            .reader
            .current_log_entry()
            .map(|log| self.signature.decode(log.topics(), log.data()))
            .transpose()?
            .unwrap_or_default();

        let names = decoded.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>();
        for (name, value) in decoded {
            state.values.set(name, value);
        }
        let outcome = execute_all(&self.instructions, state);
        state.values.remove_all(&names);
        outcome
    }
}

impl<C: ChainClient> Instruction<C> for LogEntryFilter<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let addresses = AddressFilter::evaluate("log entry addresses", self.addresses.as_ref(), state)?;

        let matching = state
            .reader
            .current_transaction()
            .ok_or_else(|| ExecutionError::UnsetCursor {
                variable: "log entry filter".to_owned(),
                scope: Scope::Transaction,
            })?
            .logs()
            .iter()
            .enumerate()
            .filter(|(_, log)| {
                self.signature.matches(log.topics()) && addresses.matches(Some(log.address()))
            })
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        trace!("{} log entries match {}", matching.len(), self.signature.name);

        for index in matching {
            let outcome = self.process_log_entry(index, state);
            state.reader.clear_current_log_entry();

            if let Err(e) = outcome {
                handle_nested_failure(
                    state,
                    &format!("error processing log entry {index} ({})", self.signature.name),
                    e,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::{Address, U256};

    use super::*;
    use crate::chain::MockChainClient;
    use crate::testing_utils::{block, log_entry, mock_state, transaction, Hook};

    type State = ProgramState<MockChainClient>;

    fn transfer() -> LogEntrySignature {
        LogEntrySignature::new(
            "Transfer",
            vec![
                LogEntryParameter::new("from", "address", true).unwrap(),
                LogEntryParameter::new("to", "address", true).unwrap(),
                LogEntryParameter::new("value", "uint256", false).unwrap(),
            ],
        )
    }

    fn address_topic(byte: u8) -> B256 {
        Address::repeat_byte(byte).into_word()
    }

    fn transfer_log(emitter: u8, from: u8, to: u8, value: u64) -> crate::eth::EthLog {
        let mut log = log_entry(
            emitter,
            vec![transfer().topic(), address_topic(from), address_topic(to)],
        );
        log.data = DynSolValue::Uint(U256::from(value), 256).abi_encode().into();
        log
    }

    #[test]
    fn topic_is_the_hash_of_the_canonical_declaration() {
        assert_eq!(
            transfer().topic(),
            keccak256("Transfer(address,address,uint256)".as_bytes())
        );
    }

    #[test]
    fn parameters_are_decoded_from_topics_and_data() {
        let log = transfer_log(9, 1, 2, 500);
        let decoded = transfer().decode(&log.topics, &log.data).unwrap();
        assert_eq!(
            decoded,
            vec![
                ("from".to_owned(), Address::repeat_byte(1).into()),
                ("to".to_owned(), Address::repeat_byte(2).into()),
                ("value".to_owned(), 500u64.into()),
            ]
        );
    }

    #[test]
    fn indexed_reference_types_yield_the_topic_hash() {
        let signature = LogEntrySignature::new(
            "Named",
            vec![LogEntryParameter::new("name", "string", true).unwrap()],
        );
        assert_eq!(signature.parameters()[0].value_type(), ValueType::Bytes);
        let hash = keccak256("alice".as_bytes());
        let decoded = signature.decode(&[signature.topic(), hash], &[]).unwrap();
        assert_eq!(decoded, vec![("name".to_owned(), hash.into())]);
    }

    #[test]
    fn topic_count_must_match_the_indexed_parameters() {
        let log = transfer_log(9, 1, 2, 500);
        assert!(matches!(
            transfer().decode(&log.topics[..2], &log.data),
            Err(ExecutionError::Decode { .. })
        ));
        assert!(matches!(
            transfer().decode(&log.topics, &[1, 2, 3]),
            Err(ExecutionError::Decode { .. })
        ));
    }

    #[test]
    fn decoded_variables_live_only_inside_the_filter() {
        let (mut state, _dir) = mock_state(MockChainClient::new());
        let mut tx = transaction(1, 2);
        tx.logs = vec![
            transfer_log(7, 1, 2, 10),
            log_entry(7, vec![keccak256("Other()".as_bytes())]),
            transfer_log(8, 3, 4, 20),
            transfer_log(7, 5, 6, 30),
        ];
        let mut b = block("a", 1);
        b.transactions.push(tx);
        state.reader.set_current_block(b);
        state.reader.set_current_transaction(0).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let hook_seen = seen.clone();
        let filter = LogEntryFilter::new(
            transfer(),
            Some(ValueAccessor::Literal(Address::repeat_byte(7).into())),
            vec![Box::new(Hook::new(move |state: &mut State| {
                let value = state.values.get("value")?.clone();
                let index = state.resolve_chain_variable("log.index")?;
                hook_seen.borrow_mut().push((value, index));
                Ok(())
            }))],
        );
        filter.execute(&mut state).unwrap();

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[0].0, Value::from(10u64));
        assert_eq!(seen.borrow()[1].0, Value::from(30u64));
        assert!(!state.values.contains("value"));
        assert!(!state.values.contains("from"));
        assert!(state.reader.current_log_entry().is_none());
    }

    #[test]
    fn decode_failures_are_reported_and_skipped() {
        let (mut state, _dir) = mock_state(MockChainClient::new());
        let mut broken = transfer_log(7, 1, 2, 10);
        broken.data = Bytes::new();
        let mut tx = transaction(1, 2);
        tx.logs = vec![broken, transfer_log(7, 1, 2, 20)];
        let mut b = block("a", 1);
        b.transactions.push(tx);
        state.reader.set_current_block(b);
        state.reader.set_current_transaction(0).unwrap();

        let count = Rc::new(RefCell::new(0));
        let hook_count = count.clone();
        LogEntryFilter::new(
            transfer(),
            None,
            vec![Box::new(Hook::new(move |_: &mut State| {
                *hook_count.borrow_mut() += 1;
                Ok(())
            }))],
        )
        .execute(&mut state)
        .unwrap();

        assert_eq!(*count.borrow(), 1);
        assert_eq!(state.exception_handler.reported_errors(), 1);
    }
}
