use std::collections::VecDeque;

use alloy::primitives::B256;
use num_bigint::BigInt;
use tracing::{debug, info, warn};

use super::handle_nested_failure;
use crate::chain::{BlockData, ChainClient};
use crate::error::{ExecutionError, ExecutionResult};
use crate::instruction::{execute_all, Instruction, ValueAccessor};
use crate::program::ProgramState;

/// Number of confirmed blocks remembered to detect reorganizations.
pub const KNOWN_BLOCKS_CAPACITY: usize = 30;

/// Bounded window of the most recently confirmed blocks, oldest first.
#[derive(Debug)]
pub struct KnownBlocks {
    blocks: VecDeque<(BigInt, B256)>,
    capacity: usize,
    truncated: bool,
}

impl KnownBlocks {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: VecDeque::with_capacity(capacity),
            capacity,
            truncated: false,
        }
    }

    pub fn push(&mut self, number: BigInt, hash: B256) {
        if self.blocks.len() == self.capacity {
            self.blocks.pop_front();
            self.truncated = true;
        }
        self.blocks.push_back((number, hash));
    }

    pub fn last(&self) -> Option<&(BigInt, B256)> {
        self.blocks.back()
    }

    pub fn pop_last(&mut self) -> Option<(BigInt, B256)> {
        self.blocks.pop_back()
    }

    /// Forgets every block, including whether older blocks were evicted.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.truncated = false;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether blocks were ever evicted to respect the capacity.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Streams the confirmed blocks of `[from, to]` to nested instructions.
///
/// Without an upper bound the filter follows the chain head until the run
/// is aborted.
pub struct BlockRangeFilter<C: ChainClient> {
    from: ValueAccessor<C>,
    to: Option<ValueAccessor<C>>,
    instructions: Vec<Box<dyn Instruction<C>>>,
}

impl<C: ChainClient> BlockRangeFilter<C> {
    pub fn new(
        from: ValueAccessor<C>,
        to: Option<ValueAccessor<C>>,
        instructions: Vec<Box<dyn Instruction<C>>>,
    ) -> Self {
        Self {
            from,
            to,
            instructions,
        }
    }

    fn bound(accessor: &ValueAccessor<C>, state: &mut ProgramState<C>) -> ExecutionResult<BigInt> {
        accessor.evaluate(state)?.into_integer().map_err(|value| {
            ExecutionError::invalid_parameters(
                "block range",
                format!("block numbers must be integers, got {value}"),
            )
        })
    }

    /// Fetches block `target`, walking back while its parent does not match
    /// the last known block.
    ///
    /// The returned block may be older than `target`; its parent is the last
    /// known block, or the window was empty. Emptying a window that already
    /// evicted blocks is a [`ExecutionError::ChainDiscontinuity`].
    fn confirm_block(
        &self,
        target: &BigInt,
        known: &mut KnownBlocks,
        state: &mut ProgramState<C>,
    ) -> ExecutionResult<C::Block> {
        let mut number = target.clone();
        loop {
            let block = state.reader.block_by_number(&number)?;
            match known.last() {
                None if known.is_truncated() => {
                    return Err(ExecutionError::ChainDiscontinuity {
                        number,
                        depth: known.capacity,
                    });
                }
                Some((last_number, last_hash)) if *last_hash != block.parent_hash() => {
                    warn!(
                        "Reorganization suspected: parent of block {number} does not match known block {last_number}, walking back"
                    );
                    known.pop_last();
                    number -= 1;
                }
                _ => {
                    known.push(number.clone(), block.hash());
                    debug!("confirmed block {number} ({})", block.hash());
                    return Ok(block);
                }
            }
        }
    }

    /// Processes one confirmed block; returns an error only when the run
    /// must stop.
    fn process_block(&self, block: C::Block, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let number = block.number().clone();
        info!("Processing block {number}");
        state.reader.set_current_block(block);

        let mut outcome = match execute_all(&self.instructions, state) {
            Ok(()) => Ok(()),
            Err(e) => handle_nested_failure(state, &format!("error processing block {number}"), e),
        };
        if outcome.is_ok() {
            if let Err(e) = state.exporters.end_block(&number) {
                outcome = handle_nested_failure(state, &format!("error exporting block {number}"), e);
            }
        }

        state.reader.clear_current_block();
        outcome
    }
}

impl<C: ChainClient> Instruction<C> for BlockRangeFilter<C> {
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        let from = Self::bound(&self.from, state)?;
        let to = self
            .to
            .as_ref()
            .map(|to| Self::bound(to, state))
            .transpose()?;
        match &to {
            Some(to) => info!("Extracting blocks {from} to {to}"),
            None => info!("Following the chain from block {from}"),
        }

        let mut known = KnownBlocks::new(KNOWN_BLOCKS_CAPACITY);
        let mut next = from;
        while to.as_ref().map_or(true, |to| &next <= to) {
            let fetched = state
                .reader
                .wait_for_block(&next)
                .and_then(|()| self.confirm_block(&next, &mut known, state));
            let block = match fetched {
                Ok(block) => block,
                Err(e @ ExecutionError::ChainDiscontinuity { .. }) => {
                    state
                        .exception_handler
                        .handle_and_decide_abort("cannot continue extracting blocks", &e);
                    return Err(ExecutionError::Aborted(Box::new(e)));
                }
                Err(e) => {
                    handle_nested_failure(state, &format!("error retrieving block {next}"), e)?;
                    // Continuity restarts from the next block that can be fetched.
                    known.reset();
                    next += 1;
                    continue;
                }
            };

            next = block.number() + 1;
            self.process_block(block, state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use alloy::primitives::Address;

    use super::*;
    use crate::exception::ExceptionHandler;
    use crate::filter::TransactionFilter;
    use crate::testing_utils::{
        block, chain_hash, forked_block, mock_state, transaction, Hook, ScriptedChain,
    };

    type State = ProgramState<ScriptedChain>;

    /// Records the number and hash of every block the nested instructions
    /// see.
    fn recorder(seen: &Rc<RefCell<Vec<(u64, B256)>>>) -> Box<dyn Instruction<ScriptedChain>> {
        let seen = seen.clone();
        Box::new(Hook::new(move |state: &mut State| {
            let block = state.reader.current_block().expect("block cursor");
            let number = u64::try_from(block.number.clone()).expect("small block number");
            seen.borrow_mut().push((number, block.hash));
            Ok(())
        }))
    }

    fn range(
        from: u64,
        to: Option<u64>,
        instructions: Vec<Box<dyn Instruction<ScriptedChain>>>,
    ) -> BlockRangeFilter<ScriptedChain> {
        BlockRangeFilter::new(
            ValueAccessor::Literal(from.into()),
            to.map(|to| ValueAccessor::Literal(to.into())),
            instructions,
        )
    }

    fn numbers(seen: &Rc<RefCell<Vec<(u64, B256)>>>) -> Vec<u64> {
        seen.borrow().iter().map(|(number, _)| *number).collect()
    }

    #[test]
    fn known_blocks_evict_the_oldest() {
        let mut known = KnownBlocks::new(2);
        for n in 0..3u64 {
            known.push(n.into(), chain_hash("a", n));
        }
        assert_eq!(known.len(), 2);
        assert!(known.is_truncated());
        assert_eq!(known.last(), Some(&(BigInt::from(2), chain_hash("a", 2))));
        known.pop_last();
        known.pop_last();
        assert!(known.is_empty());
        known.reset();
        assert!(!known.is_truncated());
    }

    #[test]
    fn single_block_range() {
        let chain = ScriptedChain::linear("a", 0..=20);
        let (mut state, _dir) = mock_state(chain);
        let seen = Rc::default();

        range(10, Some(10), vec![recorder(&seen)])
            .execute(&mut state)
            .unwrap();

        assert_eq!(numbers(&seen), [10]);
        assert!(state.reader.current_block().is_none());
    }

    #[test]
    fn inverted_range_visits_nothing() {
        let chain = ScriptedChain::linear("a", 0..=20);
        let queries = chain.queries();
        let (mut state, _dir) = mock_state(chain);
        let seen = Rc::default();

        range(10, Some(5), vec![recorder(&seen)])
            .execute(&mut state)
            .unwrap();

        assert!(numbers(&seen).is_empty());
        assert!(queries.borrow().is_empty());
    }

    #[test]
    fn reorganizations_are_walked_back() {
        let chain = ScriptedChain::linear("a", 8..=12);
        // Block 9 is replaced while block 10 is being fetched.
        chain.reorg_on_query(
            10,
            vec![
                forked_block("b", 9, "a"),
                block("b", 10),
                block("b", 11),
                block("b", 12),
            ],
        );
        let queries = chain.queries();
        let (mut state, _dir) = mock_state(chain);
        let seen = Rc::default();

        range(8, Some(12), vec![recorder(&seen)])
            .execute(&mut state)
            .unwrap();

        let queried = queries
            .borrow()
            .iter()
            .map(|n| u64::try_from(n.clone()).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(queried, [8, 9, 10, 9, 10, 11, 12]);
        assert_eq!(
            *seen.borrow(),
            [
                (8, chain_hash("a", 8)),
                (9, chain_hash("a", 9)),
                (9, chain_hash("b", 9)),
                (10, chain_hash("b", 10)),
                (11, chain_hash("b", 11)),
                (12, chain_hash("b", 12)),
            ]
        );
    }

    #[test]
    fn reorganizations_deeper_than_the_window_are_fatal() {
        let chain = ScriptedChain::linear("a", 0..=40);
        chain.reorg_on_query(35, (0..=40).map(|n| block("b", n)).collect());
        let (mut state, _dir) = mock_state(chain);
        let seen = Rc::default();

        let err = range(0, Some(40), vec![recorder(&seen)])
            .execute(&mut state)
            .unwrap_err();

        match err {
            ExecutionError::Aborted(cause) => assert!(matches!(
                *cause,
                ExecutionError::ChainDiscontinuity { depth: KNOWN_BLOCKS_CAPACITY, .. }
            )),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(numbers(&seen), (0..=34).collect::<Vec<_>>());
        assert_eq!(state.exception_handler.reported_errors(), 1);
    }

    #[test]
    fn failures_do_not_stop_later_blocks() {
        let chain = ScriptedChain::linear("a", 0..=5);
        let (mut state, dir) = mock_state(chain);
        state
            .exporters
            .register(Box::new(crate::export::LogExporter::new(
                crate::export::ExportMode::Streaming,
            )));
        let seen = Rc::default();

        let failing: Box<dyn Instruction<ScriptedChain>> = Box::new(Hook::new(|state: &mut State| {
            let number = state.resolve_chain_variable("block.number")?;
            state.exporters.add_line(&format!("block {number}"));
            if number == 2u64.into() {
                return Err(ExecutionError::UndefinedVariable("boom".into()));
            }
            Ok(())
        }));
        range(1, Some(3), vec![failing, recorder(&seen)])
            .execute(&mut state)
            .unwrap();

        assert_eq!(numbers(&seen), [1, 3]);
        assert_eq!(state.exception_handler.reported_errors(), 1);
        for n in 1..=3 {
            assert!(dir.path().join(format!("block_{n}.log")).exists());
        }
    }

    #[test]
    fn abort_stops_iterating() {
        let chain = ScriptedChain::linear("a", 0..=10);
        let (mut state, _dir) = mock_state(chain);
        state.exception_handler = ExceptionHandler::new(true);
        let seen = Rc::default();

        let failing: Box<dyn Instruction<ScriptedChain>> = Box::new(Hook::new(|state: &mut State| {
            if state.resolve_chain_variable("block.number")? == 3u64.into() {
                return Err(ExecutionError::UndefinedVariable("boom".into()));
            }
            Ok(())
        }));
        let err = range(1, None, vec![failing, recorder(&seen)])
            .execute(&mut state)
            .unwrap_err();

        assert!(err.is_abort());
        assert_eq!(numbers(&seen), [1, 2]);
        assert!(state.reader.current_block().is_none());
    }

    #[test]
    fn aborting_transaction_failures_end_the_range() {
        let chain = ScriptedChain::linear("a", 0..=5);
        chain.set_transactions(2, vec![transaction(1, 2), transaction(2, 3)]);
        chain.set_transactions(3, vec![transaction(1, 2)]);
        let queries = chain.queries();
        let (mut state, dir) = mock_state(chain);
        state.exception_handler = ExceptionHandler::new(true);
        state.exception_handler.set_output_folder(dir.path()).unwrap();
        let seen = Rc::default();

        let failing: Box<dyn Instruction<ScriptedChain>> = Box::new(Hook::new(|state: &mut State| {
            if state.resolve_chain_variable("transaction.from")? == Address::repeat_byte(2).into() {
                return Err(ExecutionError::UndefinedVariable("boom".into()));
            }
            Ok(())
        }));
        let transactions: Box<dyn Instruction<ScriptedChain>> =
            Box::new(TransactionFilter::new(None, None, vec![failing]));
        let err = range(1, Some(5), vec![transactions, recorder(&seen)])
            .execute(&mut state)
            .unwrap_err();

        assert!(err.is_abort());
        assert_eq!(numbers(&seen), [1]);
        assert_eq!(queries.borrow().last(), Some(&BigInt::from(2)));
        assert_eq!(state.exception_handler.reported_errors(), 1);
        let error_log = std::fs::read_to_string(dir.path().join("error.log")).unwrap();
        assert_eq!(error_log.lines().count(), 1, "{error_log}");
        assert!(state.reader.current_block().is_none());
        assert!(state.reader.current_transaction().is_none());
        assert!(state.reader.current_log_entry().is_none());
    }

    #[test]
    fn unavailable_blocks_are_skipped() {
        let chain = ScriptedChain::linear("a", 0..=6);
        chain.remove_block(4);
        let (mut state, _dir) = mock_state(chain);
        let seen = Rc::default();

        range(2, Some(6), vec![recorder(&seen)])
            .execute(&mut state)
            .unwrap();

        assert_eq!(numbers(&seen), [2, 3, 5, 6]);
        assert_eq!(state.exception_handler.reported_errors(), 1);
    }

    #[test]
    fn non_integer_bounds_are_rejected() {
        let (mut state, _dir) = mock_state(ScriptedChain::linear("a", 0..=1));
        let filter = BlockRangeFilter::<ScriptedChain>::new(
            ValueAccessor::Literal("zero".into()),
            None,
            vec![],
        );
        assert!(matches!(
            filter.execute(&mut state),
            Err(ExecutionError::InvalidParameters { .. })
        ));
    }
}
