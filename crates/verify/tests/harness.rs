//! End-to-end runs against stand-in servers written as shell scripts

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use smtr_verify::report::{exit_code, EXIT_FAILURE, EXIT_SUCCESS};
use smtr_verify::{HarnessConfig, Reporter, ServerConfig, TestRunner, VerifyError};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

fn write_fixture(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

fn config(cases: &Path, server_command: &str) -> HarnessConfig {
    HarnessConfig {
        cases_dir: cases.to_path_buf(),
        no_launch: false,
        server: ServerConfig {
            command: server_command.to_string(),
            build_command: None,
            startup_attempts: 5,
            line_timeout_ms: 500,
            shutdown_grace_ms: 2000,
            ..Default::default()
        },
    }
}

const READY_SERVER: &str = "echo 'Listening on port 8508'; exec sleep 60";

fn runner(config: HarnessConfig) -> (TestRunner, Captured) {
    let captured = Captured::default();
    let runner = TestRunner::with_reporter(config, Reporter::new(Box::new(captured.clone())));
    (runner, captured)
}

#[tokio::test]
async fn matching_response_passes() {
    let tmp = TempDir::new().unwrap();
    write_fixture(
        tmp.path(),
        "test-hello.request",
        "echo '{\"msg\":\"hello\",\"path\":\"/\"}'\n{\"path\": \"/\", \"msg\": \"hello\"}\n",
    );

    let (mut runner, captured) = runner(config(tmp.path(), READY_SERVER));
    let result = runner.run_all().await.unwrap();

    assert_eq!((result.total, result.passed, result.failed), (1, 1, 0));
    assert_eq!(exit_code(&result), EXIT_SUCCESS);
    assert!(captured.text().is_empty());
}

#[tokio::test]
async fn reordered_array_passes() {
    let tmp = TempDir::new().unwrap();
    write_fixture(tmp.path(), "test-array.request", "echo '[3,1,2]'\n[1,2,3]\n");

    let (mut runner, _) = runner(config(tmp.path(), READY_SERVER));
    let result = runner.run_all().await.unwrap();

    assert!(result.success());
}

#[tokio::test]
async fn missing_expectation_runs_everything_but_fails() {
    let tmp = TempDir::new().unwrap();
    write_fixture(tmp.path(), "test-a-unset.request", "echo '{\"msg\":\"new\"}'\n");
    write_fixture(tmp.path(), "test-b-ok.request", "echo '{\"msg\":\"ok\"}'\n{\"msg\":\"ok\"}");
    write_fixture(tmp.path(), "test-c-bad.request", "echo '{\"msg\":\"bad\"}'\n{\"msg\":\"good\"}");
    write_fixture(tmp.path(), "notes.txt", "not a fixture");

    let (mut runner, captured) = runner(config(tmp.path(), READY_SERVER));
    let result = runner.run_all().await.unwrap();

    assert_eq!(result.total, 3);
    assert_eq!(result.passed, 1);
    assert_eq!(result.failed, 2);
    assert_eq!(result.missing_expectations, 1);
    assert_eq!(exit_code(&result), EXIT_FAILURE);

    let text = captured.text();
    assert!(text.contains("Expectation not set for"));
    assert!(text.contains("test-a-unset.request"));
    assert!(text.contains("Test case failed (test-c-bad.request)"));
    assert!(text.contains("\"msg\": \"good\""));
    assert!(text.contains("\"msg\": \"bad\""));
}

#[tokio::test]
async fn server_exiting_early_aborts_before_fixtures() {
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("ran");
    write_fixture(
        tmp.path(),
        "test-never.request",
        &format!("touch {} && echo '{{}}'\n{{}}", marker.display()),
    );

    let (mut runner, captured) = runner(config(tmp.path(), "echo 'panicked'; exit 101"));
    let err = runner.run_all().await.unwrap_err();

    match err {
        VerifyError::ProcessExited { status, .. } => assert_eq!(status.code(), Some(101)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!marker.exists());
    assert!(captured.text().is_empty());
}

#[tokio::test]
async fn malformed_fixture_aborts_without_launching() {
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("launched");
    write_fixture(tmp.path(), "test-broken.request", "true\n{\"msg\": ");

    let server = format!("touch {}; {}", marker.display(), READY_SERVER);
    let (mut runner, _) = runner(config(tmp.path(), &server));
    let err = runner.run_all().await.unwrap_err();

    assert!(matches!(err, VerifyError::MalformedFixture { .. }));
    assert!(!marker.exists());
}

#[tokio::test]
async fn no_launch_surfaces_command_failures() {
    let tmp = TempDir::new().unwrap();
    write_fixture(
        tmp.path(),
        "test-connect.request",
        "echo 'connection refused' >&2; exit 7\n{\"msg\":\"hello\"}",
    );

    let mut cfg = config(tmp.path(), "exit 1");
    cfg.no_launch = true;

    let (mut runner, _) = runner(cfg);
    let err = runner.run_all().await.unwrap_err();

    match err {
        VerifyError::CommandExecution { fixture, stderr, .. } => {
            assert_eq!(fixture, "test-connect.request");
            assert_eq!(stderr, "connection refused");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn server_is_stopped_after_a_fatal_fixture_error() {
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("server.pid");
    write_fixture(tmp.path(), "test-garbage.request", "echo 'not json'\n{}");

    let server = format!("echo $$ > {}; {}", pid_file.display(), READY_SERVER);
    let (mut runner, _) = runner(config(tmp.path(), &server));
    let err = runner.run_all().await.unwrap_err();
    assert!(matches!(err, VerifyError::InvalidResponseJson { .. }));

    let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok();
    assert!(!alive, "server process {pid} survived the run");
}

#[tokio::test]
async fn run_named_selects_one_fixture() {
    let tmp = TempDir::new().unwrap();
    write_fixture(tmp.path(), "test-one.request", "echo 1\n1");
    write_fixture(tmp.path(), "test-two.request", "echo 2\n3");

    let (mut runner, _) = runner(config(tmp.path(), READY_SERVER));
    let result = runner.run_named("test-one").await.unwrap();
    assert_eq!(result.total, 1);
    assert!(result.success());

    let err = runner.run_named("test-three").await.unwrap_err();
    assert!(matches!(err, VerifyError::FixtureNotFound(_)));
}
