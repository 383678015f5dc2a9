use std::path::PathBuf;

/// Loads the nearest `.env` file into the process environment, where it
/// provides the `BLF_*` defaults of the command line.
///
/// Returns the loaded file, or `None` if there is none. Runs before logging
/// is set up, so the caller reports the outcome.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
