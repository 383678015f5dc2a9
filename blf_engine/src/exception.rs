//! Central fault reporting and the run-wide abort policy.

use std::error::Error as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{error, warn};

use crate::error::{ExecutionError, ExecutionResult};

/// File name of the error log inside the output folder.
pub const ERROR_LOG_FILE_NAME: &str = "error.log";

/// Reports failures and decides whether the run continues.
///
/// One handler is owned by each program run; the abort decision is the same
/// for every kind of error.
#[derive(Debug)]
pub struct ExceptionHandler {
    abort_on_exception: bool,
    error_log: Option<PathBuf>,
    reported: usize,
}

impl ExceptionHandler {
    pub fn new(abort_on_exception: bool) -> Self {
        Self {
            abort_on_exception,
            error_log: None,
            reported: 0,
        }
    }

    /// Directs the error log into `folder`, which must exist.
    pub fn set_output_folder(&mut self, folder: &Path) -> ExecutionResult<()> {
        if !folder.is_dir() {
            return Err(ExecutionError::Configuration(format!(
                "output folder '{}' does not exist",
                folder.display()
            )));
        }
        self.error_log = Some(folder.join(ERROR_LOG_FILE_NAME));
        Ok(())
    }

    pub fn abort_on_exception(&self) -> bool {
        self.abort_on_exception
    }

    pub fn error_log(&self) -> Option<&Path> {
        self.error_log.as_deref()
    }

    /// Number of failures reported so far.
    pub fn reported_errors(&self) -> usize {
        self.reported
    }

    /// Records the failure and returns `true` if the run must stop.
    pub fn handle_and_decide_abort(&mut self, message: &str, cause: &ExecutionError) -> bool {
        self.reported += 1;
        let cause = describe(cause);
        error!("{message}: {cause}");

        if let Some(path) = &self.error_log {
            let line = format!(
                "{} {message}: {cause}\n",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            );
            let written = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| file.write_all(line.as_bytes()));
            if let Err(e) = written {
                warn!("could not append to the error log {}: {e}", path.display());
            }
        }

        self.abort_on_exception
    }
}

/// Formats an error followed by its chain of causes.
fn describe(error: &ExecutionError) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}
