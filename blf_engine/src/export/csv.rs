use std::collections::HashMap;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};

use super::{first_error, write_artifact, Artifact, ExportMode, Sink};
use crate::error::ExecutionResult;

pub const DEFAULT_DELIMITER: char = ',';

/// Rows of one table. Columns are kept in first-seen order.
#[derive(Debug, Default)]
struct CsvTable {
    columns: IndexSet<String>,
    rows: Vec<HashMap<String, String>>,
}

impl CsvTable {
    fn add_row(&mut self, row: &[(String, String)]) {
        for (column, _) in row {
            if !self.columns.contains(column) {
                self.columns.insert(column.clone());
            }
        }
        self.rows.push(row.iter().cloned().collect());
    }

    fn render(&self, delimiter: char) -> String {
        let mut out = String::new();
        push_record(&mut out, self.columns.iter().map(String::as_str), delimiter);
        for row in &self.rows {
            let cells = self
                .columns
                .iter()
                .map(|column| row.get(column).map(String::as_str).unwrap_or_default());
            push_record(&mut out, cells, delimiter);
        }
        out
    }
}

fn push_record<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, delimiter: char) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        out.push_str(&quote(cell, delimiter));
    }
    out.push('\n');
}

/// Quotes a field if it contains the delimiter, a quote or a line break.
fn quote(field: &str, delimiter: char) -> String {
    if field.contains([delimiter, '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

/// Writes one CSV file per table.
///
/// The header of a table is the union of the columns of all its rows, in the
/// order they were first seen; cells missing from a row are left empty.
#[derive(Debug)]
pub struct CsvExporter {
    mode: ExportMode,
    delimiter: char,
    tables: IndexMap<String, CsvTable>,
}

impl CsvExporter {
    pub fn new(mode: ExportMode) -> Self {
        Self::with_delimiter(mode, DEFAULT_DELIMITER)
    }

    pub fn with_delimiter(mode: ExportMode, delimiter: char) -> Self {
        Self {
            mode,
            delimiter,
            tables: IndexMap::new(),
        }
    }

    fn file_name(&self, table: &str, artifact: Artifact<'_>) -> String {
        match artifact {
            Artifact::AllBlocks => format!("{table}.csv"),
            Artifact::Block(_) => format!("{table}_{}.csv", artifact.prefix()),
        }
    }
}

impl Sink for CsvExporter {
    fn mode(&self) -> ExportMode {
        self.mode
    }

    fn add_row(&mut self, table: &str, row: &[(String, String)]) {
        self.tables
            .entry(table.to_owned())
            .or_default()
            .add_row(row);
    }

    fn flush(&mut self, folder: &Path, artifact: Artifact<'_>) -> ExecutionResult<()> {
        let tables = std::mem::take(&mut self.tables);
        first_error(
            tables
                .iter()
                .filter(|(_, table)| !table.rows.is_empty())
                .map(|(name, table)| {
                    let path = folder.join(self.file_name(name, artifact));
                    write_artifact(path, &table.render(self.delimiter))
                }),
        )
    }
}
