//! smtr-verify entry point
//!
//! Run with: cargo run --package smtr-verify -- [--no-launch]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use smtr_verify::report::{self, EXIT_ERROR};
use smtr_verify::{logging, HarnessConfig, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "smtr-verify")]
#[command(about = "Run request fixtures against the smtr echo server")]
#[command(version)]
struct Args {
    /// Use an already running server instead of launching one
    #[arg(long, env = "SMTR_VERIFY_NO_LAUNCH")]
    no_launch: bool,

    /// Configuration file (TOML); missing file means defaults
    #[arg(short, long, default_value = "smtr-verify.toml")]
    config: PathBuf,

    /// Directory containing test-*.request fixtures
    #[arg(long)]
    cases_dir: Option<PathBuf>,

    /// Shell command that runs the server in the foreground
    #[arg(long)]
    server_command: Option<String>,

    /// Shell command run before launching the server
    #[arg(long)]
    build_command: Option<String>,

    /// Skip the build step
    #[arg(long)]
    skip_build: bool,

    /// Prefix of the server's readiness line
    #[arg(long)]
    ready_prefix: Option<String>,

    /// Readiness checks before giving up
    #[arg(long)]
    startup_attempts: Option<usize>,

    /// Pause between readiness checks in milliseconds
    #[arg(long)]
    startup_delay_ms: Option<u64>,

    /// Run only this fixture (file name, `.request` optional)
    #[arg(short, long)]
    name: Option<String>,

    /// Write results as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(HarnessConfig, Option<String>, Option<PathBuf>)> {
        let mut config = HarnessConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        config.no_launch |= self.no_launch;
        if let Some(dir) = self.cases_dir {
            config.cases_dir = dir;
        }
        if let Some(command) = self.server_command {
            config.server.command = command;
        }
        if let Some(command) = self.build_command {
            config.server.build_command = Some(command);
        }
        if self.skip_build {
            config.server.build_command = None;
        }
        if let Some(prefix) = self.ready_prefix {
            config.server.ready_prefix = prefix;
        }
        if let Some(attempts) = self.startup_attempts {
            config.server.startup_attempts = attempts;
        }
        if let Some(delay) = self.startup_delay_ms {
            config.server.startup_delay_ms = delay;
        }

        config.validate()?;
        Ok((config, self.name, self.output))
    }
}

fn main() {
    logging::init();

    let args = Args::parse();

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(EXIT_ERROR);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(EXIT_ERROR);
        }
    }
}

async fn async_main(args: Args) -> anyhow::Result<i32> {
    let (config, name, output) = args.into_config()?;

    let mut runner = TestRunner::new(config);

    let results = match name {
        Some(name) => runner.run_named(&name).await?,
        None => runner.run_all().await?,
    };

    if let Some(path) = output {
        report::write_results(&path, &results)?;
    }

    Ok(runner.reporter_mut().finish(&results))
}
