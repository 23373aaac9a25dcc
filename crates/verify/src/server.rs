//! Server management - building, launching and stopping the server under test

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{VerifyError, VerifyResult};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Handle to a running server process
///
/// The server runs in its own process group so that shutting it down also
/// reaches anything it spawned (`cargo run` starts the real server as a
/// child). Dropping the handle stops the server.
pub struct ServerHandle {
    child: Child,
    shutdown_grace: Duration,
    stopped: bool,
}

impl ServerHandle {
    /// Build (if configured), launch and wait for the readiness line
    pub async fn spawn(config: &ServerConfig) -> VerifyResult<Self> {
        if let Some(build) = config.build_command.as_deref().filter(|c| !c.trim().is_empty()) {
            run_build(build).await?;
        }

        info!("Launching server: {}", config.command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&config.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take();

        let mut handle = ServerHandle {
            child,
            shutdown_grace: config.shutdown_grace(),
            stopped: false,
        };

        let stdout = stdout.ok_or_else(|| {
            VerifyError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "server stdout was not captured",
            ))
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("server-stdout".to_string())
            .spawn(move || forward_lines(stdout, tx))?;

        // On error the handle is dropped here, which stops the server.
        handle.wait_for_ready(config, &mut rx).await?;

        Ok(handle)
    }

    /// Poll the server's stdout for the readiness line
    async fn wait_for_ready(
        &mut self,
        config: &ServerConfig,
        lines: &mut UnboundedReceiver<String>,
    ) -> VerifyResult<()> {
        let prefix = config.ready_prefix.as_str();

        for attempt in 1..=config.startup_attempts {
            debug!("Checking... ({}/{})", attempt, config.startup_attempts);

            if let Some(status) = self.child.try_wait()? {
                return Err(exited(status, prefix));
            }

            match timeout(config.line_timeout(), lines.recv()).await {
                Ok(Some(line)) if line.starts_with(prefix) => {
                    info!("Server ready: {}", line);
                    return Ok(());
                }
                Ok(Some(line)) => debug!("server: {}", line),
                Ok(None) => {
                    // stdout is closed, the readiness line can no longer arrive
                    return match self.wait_for_exit(config.line_timeout()).await? {
                        Some(status) => Err(exited(status, prefix)),
                        None => Err(VerifyError::StartupTimeout {
                            attempts: attempt,
                            prefix: prefix.to_string(),
                        }),
                    };
                }
                Err(_) => debug!("No output from server within {:?}", config.line_timeout()),
            }

            sleep(config.startup_delay()).await;
        }

        if let Some(status) = self.child.try_wait()? {
            return Err(exited(status, prefix));
        }

        Err(VerifyError::StartupTimeout {
            attempts: config.startup_attempts,
            prefix: prefix.to_string(),
        })
    }

    async fn wait_for_exit(&mut self, limit: Duration) -> VerifyResult<Option<ExitStatus>> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Stop the server: SIGTERM, wait, then SIGKILL after the grace period
    pub fn stop(&mut self) -> VerifyResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        if let Some(status) = self.child.try_wait()? {
            info!("Server already exited with {}", status);
            signal_group(self.child.id(), Signal::Terminate);
            return Ok(());
        }

        info!("Stopping server (pid: {})", self.child.id());
        signal_group(self.child.id(), Signal::Terminate);

        let deadline = Instant::now() + self.shutdown_grace;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!("Server exited with {}", status);
                return Ok(());
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }

        warn!("Server did not exit within {:?}, killing it", self.shutdown_grace);
        signal_group(self.child.id(), Signal::Kill);
        let _ = self.child.kill();
        self.child.wait()?;

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop server: {}", e);
        }
    }
}

/// Owns the server for the duration of a run
///
/// With `no_launch` set, start and stop do nothing and the caller is
/// responsible for a server already being up.
pub struct Supervisor {
    config: ServerConfig,
    no_launch: bool,
    server: Option<ServerHandle>,
}

impl Supervisor {
    pub fn new(config: ServerConfig, no_launch: bool) -> Self {
        Self {
            config,
            no_launch,
            server: None,
        }
    }

    pub async fn start(&mut self) -> VerifyResult<()> {
        if self.no_launch {
            info!("--no-launch: expecting a server to be running already");
            return Ok(());
        }
        if self.server.is_some() {
            return Ok(()); // Already running
        }

        self.server = Some(ServerHandle::spawn(&self.config).await?);
        Ok(())
    }

    pub fn stop(&mut self) -> VerifyResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop server: {}", e);
        }
    }
}

fn exited(status: ExitStatus, prefix: &str) -> VerifyError {
    VerifyError::ProcessExited {
        status,
        prefix: prefix.to_string(),
    }
}

async fn run_build(command: &str) -> VerifyResult<()> {
    info!("Building: {}", command);
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await?;

    if !status.success() {
        return Err(VerifyError::BuildFailed {
            command: command.to_string(),
            status,
        });
    }
    Ok(())
}

/// Forward stdout lines until the server closes it
///
/// Once the receiver is gone (the server is ready) lines go to the debug log
/// so the server never blocks on a full pipe.
fn forward_lines(stdout: ChildStdout, tx: UnboundedSender<String>) {
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else { break };
        if let Err(unsent) = tx.send(line) {
            debug!("server: {}", unsent.0);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal) {
    use nix::sys::signal::{killpg, Signal as NixSignal};
    use nix::unistd::Pid;

    let signal = match signal {
        Signal::Terminate => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    // ESRCH just means the whole group is gone already
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        debug!("killpg({}, {:?}): {}", pid, signal, e);
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: Signal) {}
