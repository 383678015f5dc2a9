//! Output sinks buffering extracted data and writing it either once per
//! block (streaming) or once per run (batch).

mod csv;
mod instructions;
mod log;
mod xes;

use std::fs;
use std::path::{Path, PathBuf};

use num_bigint::BigInt;
use tracing::debug;

pub use self::csv::CsvExporter;
pub use self::instructions::{AddCsvRow, AddLogLine, AddXesEvent, XesAttributeAccessor};
pub use self::log::LogExporter;
pub use self::xes::{EventRecord, XesAttribute, XesExporter, XesType, XesValue};
use crate::error::{ExecutionError, ExecutionResult};

/// When a sink writes its buffered content. Chosen once per sink.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ExportMode {
    /// One artifact at the end of the run.
    #[default]
    Batch,
    /// One artifact per processed block.
    Streaming,
}

/// The artifact a flush produces.
#[derive(Clone, Copy, Debug)]
pub enum Artifact<'a> {
    Block(&'a BigInt),
    AllBlocks,
}

impl Artifact<'_> {
    /// File name stem shared by the per-block and whole-run artifacts.
    pub fn prefix(&self) -> String {
        match self {
            Artifact::Block(number) => format!("block_{number}"),
            Artifact::AllBlocks => "all_blocks".to_owned(),
        }
    }
}

/// A buffering exporter. Sinks ignore the kinds of record they do not
/// export.
pub trait Sink {
    fn mode(&self) -> ExportMode;

    fn add_row(&mut self, _table: &str, _row: &[(String, String)]) {}

    fn add_line(&mut self, _line: &str) {}

    fn add_event(&mut self, _event: &EventRecord) {}

    /// Writes and clears the buffered content. Writes nothing if the buffer
    /// is empty.
    fn flush(&mut self, folder: &Path, artifact: Artifact<'_>) -> ExecutionResult<()>;

    fn end_block(&mut self, folder: &Path, number: &BigInt) -> ExecutionResult<()> {
        match self.mode() {
            ExportMode::Streaming => self.flush(folder, Artifact::Block(number)),
            ExportMode::Batch => Ok(()),
        }
    }

    fn end_program(&mut self, folder: &Path) -> ExecutionResult<()> {
        match self.mode() {
            ExportMode::Batch => self.flush(folder, Artifact::AllBlocks),
            ExportMode::Streaming => Ok(()),
        }
    }
}

/// The sinks registered for one run, all writing into the same folder.
pub struct ExporterSet {
    folder: PathBuf,
    sinks: Vec<Box<dyn Sink>>,
}

impl ExporterSet {
    pub fn new(folder: PathBuf) -> Self {
        Self {
            folder,
            sinks: Vec::new(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn register(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn add_row(&mut self, table: &str, row: &[(String, String)]) {
        for sink in &mut self.sinks {
            sink.add_row(table, row);
        }
    }

    pub fn add_line(&mut self, line: &str) {
        for sink in &mut self.sinks {
            sink.add_line(line);
        }
    }

    pub fn add_event(&mut self, event: &EventRecord) {
        for sink in &mut self.sinks {
            sink.add_event(event);
        }
    }

    /// Flushes the streaming sinks. Every sink is flushed even if one fails;
    /// the first failure is returned.
    pub fn end_block(&mut self, number: &BigInt) -> ExecutionResult<()> {
        let folder = &self.folder;
        first_error(self.sinks.iter_mut().map(|sink| sink.end_block(folder, number)))
    }

    /// Flushes the batch sinks, with the same failure policy as
    /// [`ExporterSet::end_block`].
    pub fn end_program(&mut self) -> ExecutionResult<()> {
        let folder = &self.folder;
        first_error(self.sinks.iter_mut().map(|sink| sink.end_program(folder)))
    }
}

pub(crate) fn first_error(results: impl Iterator<Item = ExecutionResult<()>>) -> ExecutionResult<()> {
    results.fold(Ok(()), |first, result| first.and(result))
}

pub(crate) fn write_artifact(path: PathBuf, contents: &str) -> ExecutionResult<()> {
    fs::write(&path, contents).map_err(|source| ExecutionError::Export {
        path: path.clone(),
        source,
    })?;
    debug!("wrote {}", path.display());
    Ok(())
}
