//! smtr request verification harness
//!
//! This crate drives the `smtr` echo server as a black box:
//! - Builds and spawns the server, waiting for its readiness line
//! - Runs the shell command of every `test-*.request` fixture
//! - Normalizes actual and expected JSON so key and element order don't matter
//! - Reports mismatches on stderr and maps the run to an exit status
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  smtr-verify (Rust)                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── Supervisor::start() -> ServerHandle                  │
//! │    ├── Fixture::load_all(dir) -> [Fixture]                  │
//! │    ├── run_fixture(fixture) -> FixtureResult                │
//! │    │     └── normalize(actual) == normalize(expected)       │
//! │    ├── Reporter::record(result)                             │
//! │    └── Supervisor::stop()          (on every exit path)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fixture (test-*.request)                                   │
//! │    ├── line 1: shell command printing JSON                  │
//! │    └── rest:   expected JSON (empty = not set yet)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod fixture;
pub mod logging;
pub mod normalize;
pub mod report;
pub mod runner;
pub mod server;

pub use config::{HarnessConfig, ServerConfig};
pub use error::{VerifyError, VerifyResult};
pub use fixture::Fixture;
pub use normalize::{normalize, NormalizedValue};
pub use report::Reporter;
pub use runner::{FixtureOutcome, FixtureResult, RunResult, TestRunner};
pub use server::{ServerHandle, Supervisor};
