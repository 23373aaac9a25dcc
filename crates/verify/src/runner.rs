//! Test runner that orchestrates the server, the fixtures and the comparison

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::HarnessConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::fixture::Fixture;
use crate::normalize::{normalize, NormalizedValue};
use crate::report::Reporter;
use crate::server::Supervisor;

/// Comparison outcome of a single fixture
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FixtureOutcome {
    Passed,
    Mismatch {
        expected: NormalizedValue,
        actual: NormalizedValue,
    },
}

/// Result of running a single fixture
#[derive(Debug, Clone, Serialize)]
pub struct FixtureResult {
    pub name: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: FixtureOutcome,
    pub expectation_missing: bool,
    pub duration_ms: u64,
}

impl FixtureResult {
    pub fn success(&self) -> bool {
        self.outcome == FixtureOutcome::Passed && !self.expectation_missing
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub missing_expectations: usize,
    pub duration_ms: u64,
    pub results: Vec<FixtureResult>,
}

impl RunResult {
    fn record(&mut self, result: FixtureResult) {
        self.total += 1;
        if result.expectation_missing {
            self.missing_expectations += 1;
        }
        match result.outcome {
            FixtureOutcome::Mismatch { .. } => self.failed += 1,
            FixtureOutcome::Passed if !result.expectation_missing => self.passed += 1,
            FixtureOutcome::Passed => {}
        }
        self.results.push(result);
    }

    /// Every fixture matched and none lacked an expectation
    pub fn success(&self) -> bool {
        self.failed == 0 && self.missing_expectations == 0
    }
}

/// Runs fixtures against the server under test
pub struct TestRunner {
    config: HarnessConfig,
    supervisor: Supervisor,
    reporter: Reporter,
}

impl TestRunner {
    /// Create a runner reporting to stderr
    pub fn new(config: HarnessConfig) -> Self {
        Self::with_reporter(config, Reporter::stderr())
    }

    pub fn with_reporter(config: HarnessConfig, reporter: Reporter) -> Self {
        let supervisor = Supervisor::new(config.server.clone(), config.no_launch);
        Self {
            config,
            supervisor,
            reporter,
        }
    }

    pub fn reporter_mut(&mut self) -> &mut Reporter {
        &mut self.reporter
    }

    /// Run every fixture in the cases directory
    pub async fn run_all(&mut self) -> VerifyResult<RunResult> {
        let fixtures = Fixture::load_all(&self.config.cases_dir)?;
        if fixtures.is_empty() {
            warn!("No test-*.request fixtures in {}", self.config.cases_dir.display());
        }
        self.run_fixtures(&fixtures).await
    }

    /// Run a single fixture selected by file name
    pub async fn run_named(&mut self, name: &str) -> VerifyResult<RunResult> {
        let fixture = Fixture::load_all(&self.config.cases_dir)?
            .into_iter()
            .find(|f| f.matches_name(name))
            .ok_or_else(|| VerifyError::FixtureNotFound(name.to_string()))?;

        self.run_fixtures(std::slice::from_ref(&fixture)).await
    }

    /// Run fixtures with the server up; the server is stopped on every path
    ///
    /// The server lives in its own process group, so a Ctrl-C at the
    /// terminal only reaches the harness. It is turned into
    /// [`VerifyError::Interrupted`] after the server has been stopped.
    pub async fn run_fixtures(&mut self, fixtures: &[Fixture]) -> VerifyResult<RunResult> {
        let outcome = tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    warn!("Received interrupt, stopping server");
                    Err(VerifyError::Interrupted)
                }
                Err(e) => Err(VerifyError::Io(e)),
            },
            outcome = self.start_and_execute(fixtures) => outcome,
        };
        let stopped = self.supervisor.stop();

        let result = outcome?;
        stopped?;
        Ok(result)
    }

    async fn start_and_execute(&mut self, fixtures: &[Fixture]) -> VerifyResult<RunResult> {
        self.supervisor.start().await?;
        self.execute_all(fixtures).await
    }

    async fn execute_all(&mut self, fixtures: &[Fixture]) -> VerifyResult<RunResult> {
        let start = Instant::now();
        let mut run = RunResult::default();

        info!("Running {} fixture(s)...", fixtures.len());

        for fixture in fixtures {
            let result = run_fixture(fixture).await?;

            if result.success() {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else if result.expectation_missing {
                warn!("? {} - expectation not set", result.name);
            } else {
                error!("✗ {}", result.name);
            }

            self.reporter.record(&result)?;
            run.record(result);
        }

        run.duration_ms = start.elapsed().as_millis() as u64;
        Ok(run)
    }
}

/// Run one fixture's command and compare its response
pub async fn run_fixture(fixture: &Fixture) -> VerifyResult<FixtureResult> {
    let start = Instant::now();
    debug!("Running {}: {}", fixture.name, fixture.command);

    let response = execute_command(fixture).await?;

    let expected = normalize(&fixture.expected);
    let actual = normalize(&response);

    let outcome = if expected == actual {
        FixtureOutcome::Passed
    } else {
        FixtureOutcome::Mismatch { expected, actual }
    };

    Ok(FixtureResult {
        name: fixture.name.clone(),
        path: fixture.path.clone(),
        outcome,
        expectation_missing: fixture.expectation_missing,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Run the fixture command through the shell and parse its stdout as JSON
pub async fn execute_command(fixture: &Fixture) -> VerifyResult<Value> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(&fixture.command)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(VerifyError::CommandExecution {
            fixture: fixture.name.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|source| VerifyError::InvalidResponseJson {
        fixture: fixture.name.clone(),
        source,
    })
}
