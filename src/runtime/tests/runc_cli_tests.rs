//! Integration test: `RuncCli` against a shell-script stand-in for runc.
//!
//! The runtime binary is `sh` with the script path as the first global
//! argument, so every invocation becomes `sh <script> <subcommand> ...`.

use std::fs;
use std::path::{Path, PathBuf};

use boxrun_core::config::RuntimeConfig;
use boxrun_core::error::BoxError;
use boxrun_runtime::{ContainerRuntime, ContainerStatus, RuncCli};
use tempfile::TempDir;

const FAKE_RUNC: &str = r#"
sub="$1"; shift
case "$sub" in
  state)
    case "$1" in
      running-box)
        printf '{"ociVersion":"1.0.2","id":"%s","pid":77,"status":"running","bundle":"/b"}' "$1"
        exit 0 ;;
      paused-box)
        printf '{"id":"%s","status":"paused"}' "$1"
        exit 0 ;;
      broken-box)
        echo 'permission denied' >&2
        exit 1 ;;
    esac
    echo "time=\"2024-01-01T00:00:00Z\" level=error msg=\"container does not exist\"" >&2
    exit 1 ;;
  run)
    if [ "$1" = "--detach" ]; then
      shift
      if [ "$1" = "fail-box" ]; then
        echo "cannot start container $1" >&2
        exit 1
      fi
      echo "started $1 in $(pwd)"
      exit 0
    fi
    case "$1" in
      code-*) exit "${1#code-}" ;;
    esac
    exit 0 ;;
  exec)
    [ "$1" = "--tty" ] && shift
    shift
    "$@"
    exit $? ;;
  delete)
    [ "$1" = "--force" ] && shift
    [ "$1" = "running-box" ] && exit 0
    echo "container does not exist" >&2
    exit 1 ;;
esac
echo "unknown subcommand $sub" >&2
exit 2
"#;

fn fake_runc(dir: &Path) -> RuncCli {
    let script = dir.join("fake-runc.sh");
    fs::write(&script, FAKE_RUNC).unwrap();
    RuncCli::new(&RuntimeConfig {
        binary: PathBuf::from("sh"),
        global_args: vec![script.display().to_string()],
    })
}

fn shell(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

#[test]
fn test_state_missing_container() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());

    assert!(runc.state("nobody").unwrap().is_none());
}

#[test]
fn test_state_running_container() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());

    let state = runc.state("running-box").unwrap().unwrap();

    assert_eq!(state.status, ContainerStatus::Running);
    assert_eq!(state.id, "running-box");
    assert_eq!(state.pid, Some(77));
}

#[test]
fn test_state_other_status() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());

    let state = runc.state("paused-box").unwrap().unwrap();

    assert_eq!(state.status, ContainerStatus::Paused);
}

#[test]
fn test_state_failure_surfaces_diagnostic() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());

    match runc.state("broken-box").unwrap_err() {
        BoxError::RuntimeError { action, message } => {
            assert_eq!(action, "state");
            assert_eq!(message, "permission denied");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_run_returns_exit_code() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());

    assert_eq!(runc.run("code-0", tmp.path(), false).unwrap(), 0);
    assert_eq!(runc.run("code-4", tmp.path(), false).unwrap(), 4);
}

#[test]
fn test_run_detached_logs_to_file() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());
    let bundle = tmp.path().join("bundle");
    fs::create_dir(&bundle).unwrap();

    runc.run_detached("ci", &bundle).unwrap();

    let log = fs::read_to_string(bundle.join("runtime.log")).unwrap();
    assert!(log.starts_with("started ci in "));
    assert!(log.trim_end().ends_with("bundle"));
}

#[test]
fn test_run_detached_failure_includes_log() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());

    match runc.run_detached("fail-box", tmp.path()).unwrap_err() {
        BoxError::RuntimeError { action, message } => {
            assert_eq!(action, "run --detach");
            assert_eq!(message, "cannot start container fail-box");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_exec_propagates_exit_code() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());

    assert_eq!(runc.exec("ci", tmp.path(), &shell("exit 0"), false).unwrap(), 0);
    assert_eq!(runc.exec("ci", tmp.path(), &shell("exit 7"), false).unwrap(), 7);
}

#[test]
fn test_exec_runs_in_bundle_directory() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());
    let bundle = tmp.path().join("bundle");
    fs::create_dir(&bundle).unwrap();
    fs::write(bundle.join("marker"), "").unwrap();

    assert_eq!(
        runc.exec("ci", &bundle, &shell("test -f marker"), false).unwrap(),
        0
    );
    assert_eq!(
        runc.exec("ci", tmp.path(), &shell("test -f marker"), false).unwrap(),
        1
    );
}

#[test]
fn test_exec_signal_maps_to_128_plus_signal() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());

    let code = runc
        .exec("ci", tmp.path(), &shell("kill -9 $$"), false)
        .unwrap();

    assert_eq!(code, 137);
}

#[test]
fn test_delete() {
    let tmp = TempDir::new().unwrap();
    let runc = fake_runc(tmp.path());

    assert!(runc.delete("running-box", true).unwrap());
    assert!(!runc.delete("nobody", true).unwrap());
}
