//! An execution engine for blockchain data extraction programs.
//!
//! A [`Program`] is a tree of [`Instruction`]s. Filters are instructions that
//! iterate a data dimension (a block range, the transactions of a block, the
//! log entries of a transaction) and run their nested instructions once per
//! matching item, with the reader's cursor pointing at that item:
//!
//! ```text
//! Program
//! └── BlockRangeFilter (10..=20)
//!     ├── VariableAssignment
//!     └── TransactionFilter (senders, recipients)
//!         └── LogEntryFilter (Transfer(address indexed, address indexed, uint256))
//!             └── AddCsvRow
//! ```
//!
//! The block range walker tolerates chain reorganizations: it remembers the
//! last [`KNOWN_BLOCKS_CAPACITY`] confirmed blocks and walks back whenever a
//! new block does not extend them.
//!
//! Failures of nested instructions are routed through the
//! [`ExceptionHandler`] of the run, which appends them to `error.log` in the
//! output folder and decides, based on a single global flag, whether the run
//! continues. Extracted data is handed to [exporters](export) writing CSV
//! tables, plain logs and XES event logs, either once per block or once per
//! run.
//!
//! The engine is generic over the [`ChainClient`] capability; [`eth`]
//! provides the Ethereum data model and its variable catalog.

#![deny(rustdoc::broken_intra_doc_links)]

pub mod abi;
pub mod chain;
pub mod error;
pub mod eth;
pub mod exception;
pub mod export;
pub mod filter;
pub mod instruction;
pub mod library;
pub mod program;
pub mod reader;
pub mod stdlib;
pub mod store;
pub mod value;
pub mod variables;

#[cfg(test)]
pub(crate) mod testing_utils;

pub use chain::{BlockData, ChainClient, LogData, TransactionData};
pub use error::{ExecutionError, ExecutionResult};
pub use exception::ExceptionHandler;
pub use filter::KNOWN_BLOCKS_CAPACITY;
pub use instruction::Instruction;
pub use program::{EngineConfig, Program, ProgramState};
pub use value::{Value, ValueType};
