//! Failure output, results file and exit status

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::VerifyResult;
use crate::runner::{FixtureOutcome, FixtureResult, RunResult};

/// Every fixture passed with its expectation set
pub const EXIT_SUCCESS: i32 = 0;
/// A fixture mismatched or had no expectation
pub const EXIT_FAILURE: i32 = 1;
/// The run aborted before finishing
pub const EXIT_ERROR: i32 = 2;

/// Writes failure details to the error channel
pub struct Reporter {
    out: Box<dyn Write + Send>,
}

impl Reporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Report a single fixture; passing fixtures print nothing
    pub fn record(&mut self, result: &FixtureResult) -> VerifyResult<()> {
        if result.expectation_missing {
            writeln!(self.out, "Expectation not set for {}", result.path.display())?;
        }

        if let FixtureOutcome::Mismatch { expected, actual } = &result.outcome {
            writeln!(self.out, "Test case failed ({})", result.name)?;
            writeln!(self.out, "Expected:")?;
            writeln!(self.out, "{}", expected)?;
            writeln!(self.out, "\nGot:")?;
            writeln!(self.out, "{}", actual)?;
        }

        self.out.flush()?;
        Ok(())
    }

    /// Summarize the run and pick the exit status
    pub fn finish(&mut self, result: &RunResult) -> i32 {
        info!(
            "Results: {} passed, {} failed, {} missing expectation(s) ({} ms)",
            result.passed, result.failed, result.missing_expectations, result.duration_ms
        );
        exit_code(result)
    }
}

pub fn exit_code(result: &RunResult) -> i32 {
    if result.success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}

/// Write the run result as pretty JSON
pub fn write_results(path: &Path, result: &RunResult) -> VerifyResult<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path.to_path_buf())
}
