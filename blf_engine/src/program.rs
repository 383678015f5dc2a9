//! The root of an instruction tree and the mutable state threaded through
//! its execution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::chain::ChainClient;
use crate::error::{ExecutionError, ExecutionResult};
use crate::exception::ExceptionHandler;
use crate::export::ExporterSet;
use crate::instruction::{execute_all, Instruction};
use crate::reader::{DataReader, DEFAULT_POLL_INTERVAL};
use crate::store::ValueStore;
use crate::value::Value;
use crate::variables::VariableCatalog;

/// Settings of a single run.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Interval between two polls of the chain head while waiting for new
    /// blocks.
    pub poll_interval: Duration,
    /// Whether the first reported failure stops the run.
    pub abort_on_exception: bool,
    /// Existing folder receiving exported artifacts and the error log.
    pub output_folder: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            abort_on_exception: false,
            output_folder: PathBuf::from("."),
        }
    }
}

/// Everything an instruction may read or mutate during a run.
pub struct ProgramState<C: ChainClient> {
    pub values: ValueStore,
    pub reader: DataReader<C>,
    pub exporters: ExporterSet,
    pub exception_handler: ExceptionHandler,
    catalog: Arc<VariableCatalog<C::Block>>,
}

impl<C: ChainClient> ProgramState<C> {
    pub fn new(
        client: C,
        catalog: Arc<VariableCatalog<C::Block>>,
        config: &EngineConfig,
    ) -> ExecutionResult<Self> {
        let mut exception_handler = ExceptionHandler::new(config.abort_on_exception);
        exception_handler.set_output_folder(&config.output_folder)?;

        Ok(Self {
            values: ValueStore::new(),
            reader: DataReader::new(client, config.poll_interval),
            exporters: ExporterSet::new(config.output_folder.clone()),
            exception_handler,
            catalog,
        })
    }

    pub fn catalog(&self) -> &VariableCatalog<C::Block> {
        &self.catalog
    }

    /// Reads a chain variable at the current cursor position.
    pub fn resolve_chain_variable(&self, name: &str) -> ExecutionResult<Value> {
        self.catalog.resolve(name, &self.reader)
    }
}

/// Root of an instruction tree.
pub struct Program<C: ChainClient> {
    instructions: Vec<Box<dyn Instruction<C>>>,
}

impl<C: ChainClient> Program<C> {
    pub fn new(instructions: Vec<Box<dyn Instruction<C>>>) -> Self {
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Box<dyn Instruction<C>>] {
        &self.instructions
    }

    /// Runs every top-level instruction, then finalizes the batch exporters
    /// and closes the reader.
    ///
    /// Failures never escape. The first failing top-level instruction ends
    /// the run: its failure is reported to the exception handler unless a
    /// filter already reported it while aborting.
    pub fn execute(&self, state: &mut ProgramState<C>) {
        info!("executing a program of {} instructions", self.instructions.len());

        match execute_all(&self.instructions, state) {
            Ok(()) => {}
            Err(ExecutionError::Aborted(cause)) => {
                warn!("program execution aborted: {cause}");
            }
            Err(e) => {
                state
                    .exception_handler
                    .handle_and_decide_abort("error during program execution", &e);
            }
        }

        if let Err(e) = state.exporters.end_program() {
            state
                .exception_handler
                .handle_and_decide_abort("error exporting data", &e);
        }

        state.reader.close();
        info!(
            "program execution finished with {} reported errors",
            state.exception_handler.reported_errors()
        );
    }
}
