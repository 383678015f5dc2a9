use std::path::Path;

use super::{write_artifact, Artifact, ExportMode, Sink};
use crate::error::ExecutionResult;

/// Writes free-form lines to `<prefix>.log`.
#[derive(Debug, Default)]
pub struct LogExporter {
    mode: ExportMode,
    lines: Vec<String>,
}

impl LogExporter {
    pub fn new(mode: ExportMode) -> Self {
        Self {
            mode,
            lines: Vec::new(),
        }
    }
}

impl Sink for LogExporter {
    fn mode(&self) -> ExportMode {
        self.mode
    }

    fn add_line(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }

    fn flush(&mut self, folder: &Path, artifact: Artifact<'_>) -> ExecutionResult<()> {
        if self.lines.is_empty() {
            return Ok(());
        }
        let mut contents = self.lines.join("\n");
        contents.push('\n');
        self.lines.clear();
        write_artifact(folder.join(format!("{}.log", artifact.prefix())), &contents)
    }
}
