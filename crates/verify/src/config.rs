//! Harness configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory holding `test-*.request` fixtures
    pub cases_dir: PathBuf,

    /// Use an already running server instead of launching one
    pub no_launch: bool,

    /// Server under test
    pub server: ServerConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cases_dir: PathBuf::from("test-cases"),
            no_launch: false,
            server: ServerConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> VerifyResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> VerifyResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| VerifyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VerifyResult<()> {
        if !self.no_launch && self.server.command.trim().is_empty() {
            return Err(VerifyError::Config("server.command is empty".to_string()));
        }
        if self.server.startup_attempts == 0 {
            return Err(VerifyError::Config(
                "server.startup_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How to build, launch and stop the server under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Shell command that runs the server in the foreground
    pub command: String,

    /// Shell command run once before launching (None = no build step)
    pub build_command: Option<String>,

    /// Prefix of the stdout line announcing the server is ready
    pub ready_prefix: String,

    /// Readiness checks before giving up
    pub startup_attempts: usize,

    /// Pause between readiness checks
    pub startup_delay_ms: u64,

    /// Longest wait for a single stdout line during startup
    pub line_timeout_ms: u64,

    /// Time between SIGTERM and SIGKILL on shutdown
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "cargo run --example echo-server --quiet".to_string(),
            build_command: Some("cargo build --examples".to_string()),
            ready_prefix: "Listening on port ".to_string(),
            startup_attempts: 10,
            startup_delay_ms: 10,
            line_timeout_ms: 5000,
            shutdown_grace_ms: 5000,
        }
    }
}

impl ServerConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn line_timeout(&self) -> Duration {
        Duration::from_millis(self.line_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.cases_dir, PathBuf::from("test-cases"));
        assert!(!config.no_launch);
        assert_eq!(config.server.ready_prefix, "Listening on port ");
        assert_eq!(config.server.startup_attempts, 10);
        assert_eq!(config.server.startup_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
cases_dir = "smtr/test-cases"

[server]
command = "./target/debug/examples/echo-server"
startup_attempts = 3
"#,
        )
        .unwrap();

        assert_eq!(config.cases_dir, PathBuf::from("smtr/test-cases"));
        assert_eq!(config.server.command, "./target/debug/examples/echo-server");
        assert_eq!(config.server.startup_attempts, 3);
        assert_eq!(config.server.ready_prefix, "Listening on port ");
        assert_eq!(config.server.build_command.as_deref(), Some("cargo build --examples"));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = HarnessConfig::from_toml("[server]\nstartup_attempts = 0\n").unwrap_err();
        assert!(matches!(err, VerifyError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = HarnessConfig::load(Path::new("/nonexistent/smtr-verify.toml")).unwrap();
        assert_eq!(config.server.startup_attempts, 10);
    }
}
