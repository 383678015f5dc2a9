//! Chain fixtures shared by the unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{keccak256, Address, B256};
use anyhow::anyhow;
use num_bigint::BigInt;

use crate::chain::ChainClient;
use crate::error::ExecutionResult;
use crate::eth::{self, EthBlock, EthLog, EthTransaction};
use crate::instruction::Instruction;
use crate::program::{EngineConfig, ProgramState};
use crate::value::Value;

pub(crate) fn common_setup() {
    // Try to initialize the logger, ignoring errors if it was already set.
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Deterministic hash of block `number` on the chain `fork`.
pub(crate) fn chain_hash(fork: &str, number: u64) -> B256 {
    keccak256(format!("{fork}:{number}").as_bytes())
}

/// Block `number` of `fork`, child of block `number - 1` of `parent_fork`.
pub(crate) fn forked_block(fork: &str, number: u64, parent_fork: &str) -> EthBlock {
    EthBlock {
        number: number.into(),
        hash: chain_hash(fork, number),
        parent_hash: match number {
            0 => B256::ZERO,
            n => chain_hash(parent_fork, n - 1),
        },
        timestamp: (1_600_000_000 + 12 * number).into(),
        gas_limit: 30_000_000u64.into(),
        ..Default::default()
    }
}

pub(crate) fn block(fork: &str, number: u64) -> EthBlock {
    forked_block(fork, number, fork)
}

pub(crate) fn transaction(from: u8, to: u8) -> EthTransaction {
    EthTransaction {
        hash: keccak256([from, to]),
        from: Address::repeat_byte(from),
        to: Some(Address::repeat_byte(to)),
        success: true,
        ..Default::default()
    }
}

pub(crate) fn log_entry(address: u8, topics: Vec<B256>) -> EthLog {
    EthLog {
        address: Address::repeat_byte(address),
        topics,
        ..Default::default()
    }
}

/// State for a run against `client`, writing into a fresh temporary folder.
pub(crate) fn mock_state<C>(client: C) -> (ProgramState<C>, tempfile::TempDir)
where
    C: ChainClient<Block = EthBlock>,
{
    common_setup();
    let dir = tempfile::tempdir().expect("temporary output folder");
    let config = EngineConfig {
        poll_interval: Duration::ZERO,
        abort_on_exception: false,
        output_folder: dir.path().to_path_buf(),
    };
    let state = ProgramState::new(client, Arc::new(eth::catalog()), &config)
        .expect("valid configuration");
    (state, dir)
}

/// An in-memory chain whose blocks can be replaced while it is being read.
#[derive(Default)]
pub(crate) struct ScriptedChain {
    blocks: RefCell<BTreeMap<u64, EthBlock>>,
    reorgs: RefCell<HashMap<u64, Vec<EthBlock>>>,
    queries: Rc<RefCell<Vec<BigInt>>>,
}

impl ScriptedChain {
    /// The blocks `numbers` of `fork`, each the child of the previous one.
    pub(crate) fn linear(fork: &str, numbers: RangeInclusive<u64>) -> Self {
        let chain = Self::default();
        chain
            .blocks
            .borrow_mut()
            .extend(numbers.map(|n| (n, block(fork, n))));
        chain
    }

    /// Replaces blocks by `replacements` when block `number` is first
    /// requested.
    pub(crate) fn reorg_on_query(&self, number: u64, replacements: Vec<EthBlock>) {
        self.reorgs.borrow_mut().insert(number, replacements);
    }

    /// Gives block `number` the transactions `transactions`.
    pub(crate) fn set_transactions(&self, number: u64, transactions: Vec<EthTransaction>) {
        if let Some(block) = self.blocks.borrow_mut().get_mut(&number) {
            block.transactions = transactions;
        }
    }

    pub(crate) fn remove_block(&self, number: u64) {
        self.blocks.borrow_mut().remove(&number);
    }

    /// Block numbers requested so far, shared with the chain.
    pub(crate) fn queries(&self) -> Rc<RefCell<Vec<BigInt>>> {
        self.queries.clone()
    }
}

impl ChainClient for ScriptedChain {
    type Block = EthBlock;

    fn latest_block_number(&self) -> anyhow::Result<BigInt> {
        self.blocks
            .borrow()
            .keys()
            .next_back()
            .map(|n| BigInt::from(*n))
            .ok_or_else(|| anyhow!("empty chain"))
    }

    fn block_by_number(&self, number: &BigInt) -> anyhow::Result<EthBlock> {
        self.queries.borrow_mut().push(number.clone());
        let number = u64::try_from(number)?;
        if let Some(replacements) = self.reorgs.borrow_mut().remove(&number) {
            let mut blocks = self.blocks.borrow_mut();
            for block in replacements {
                blocks.insert(u64::try_from(&block.number)?, block);
            }
        }
        self.blocks
            .borrow()
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow!("block {number} not found"))
    }

    fn query_public_member(
        &self,
        contract: &Address,
        _: &BigInt,
        member: &str,
        _: &[Value],
        _: &[String],
    ) -> anyhow::Result<Vec<Value>> {
        Err(anyhow!("no contract {contract} with member {member}"))
    }
}

/// An instruction running a closure, used to observe or break execution.
pub(crate) struct Hook<F>(F);

impl<F> Hook<F> {
    pub(crate) fn new(f: F) -> Self {
        Self(f)
    }
}

impl<C, F> Instruction<C> for Hook<F>
where
    C: ChainClient,
    F: Fn(&mut ProgramState<C>) -> ExecutionResult<()>,
{
    fn execute(&self, state: &mut ProgramState<C>) -> ExecutionResult<()> {
        (self.0)(state)
    }
}
