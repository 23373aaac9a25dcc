//! Request fixtures: `test-*.request` files
//!
//! The first line of a fixture is a shell command whose standard output is
//! a JSON document. Everything after it is the expected document. An empty
//! expectation is allowed so a new fixture can be run once to see what the
//! server answers, but such a fixture always fails the run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{VerifyError, VerifyResult};

const FIXTURE_PREFIX: &str = "test-";
const FIXTURE_SUFFIX: &str = ".request";

/// A single request fixture
#[derive(Debug, Clone, Serialize)]
pub struct Fixture {
    /// File name, used as the fixture identity
    pub name: String,

    pub path: PathBuf,

    /// Shell command producing the actual response
    pub command: String,

    /// Expected response; `{}` when the file has no expectation
    pub expected: Value,

    /// The expectation section of the file was empty
    pub expectation_missing: bool,
}

impl Fixture {
    /// Parse fixture text; `path` is only used for naming and errors
    pub fn parse(path: &Path, content: &str) -> VerifyResult<Self> {
        let (first_line, rest) = match content.split_once('\n') {
            Some((line, rest)) => (line, rest),
            None => (content, ""),
        };

        let command = first_line.trim();
        if command.is_empty() {
            return Err(VerifyError::MalformedFixture {
                path: path.to_path_buf(),
                reason: "missing command on first line".to_string(),
            });
        }

        let (expected, expectation_missing) = if rest.trim().is_empty() {
            (Value::Object(Default::default()), true)
        } else {
            let expected = serde_json::from_str(rest).map_err(|e| VerifyError::MalformedFixture {
                path: path.to_path_buf(),
                reason: format!("expected response is not valid JSON: {}", e),
            })?;
            (expected, false)
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            path: path.to_path_buf(),
            command: command.to_string(),
            expected,
            expectation_missing,
        })
    }

    /// Load a fixture from a file
    pub fn from_file(path: &Path) -> VerifyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture = Self::parse(path, &content)?;
        if fixture.expectation_missing {
            warn!("No expectation in {}", path.display());
        }
        Ok(fixture)
    }

    /// Load all fixtures in a directory, ordered by file name
    pub fn load_all(dir: &Path) -> VerifyResult<Vec<Self>> {
        let mut paths = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .follow_links(true)
            .min_depth(1)
            .max_depth(1)
        {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io) => VerifyError::Io(io),
                None => VerifyError::Config(format!("cannot read {}", dir.display())),
            })?;
            if entry.file_type().is_file() && is_fixture_name(&entry.file_name().to_string_lossy()) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        debug!("Found {} fixture(s) in {}", paths.len(), dir.display());
        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Whether this fixture is selected by `name`, with or without the suffix
    pub fn matches_name(&self, name: &str) -> bool {
        self.name == name || self.name.strip_suffix(FIXTURE_SUFFIX) == Some(name)
    }
}

/// `test-*.request`
pub fn is_fixture_name(file_name: &str) -> bool {
    file_name.len() >= FIXTURE_PREFIX.len() + FIXTURE_SUFFIX.len()
        && file_name.starts_with(FIXTURE_PREFIX)
        && file_name.ends_with(FIXTURE_SUFFIX)
}
