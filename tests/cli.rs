use assert_cmd::Command;
use predicates::prelude::*;

fn tube_remote() -> Command {
    Command::cargo_bin("tube-remote").expect("tube-remote binary")
}

#[test]
fn prints_version() {
    tube_remote()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    tube_remote()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tube-remote"))
        .stdout(predicate::str::contains("--version"))
        .stdout(predicate::str::contains("send <command>"));
}

#[test]
fn lists_command_names() {
    tube_remote()
        .arg("--commands")
        .assert()
        .success()
        .stdout(predicate::str::contains("navigator_select"))
        .stdout(predicate::str::contains("skip_forward"))
        .stdout(predicate::str::contains("exit"));
}

#[test]
fn rejects_unknown_commands_before_connecting() {
    tube_remote()
        .args(["send", "quality_up"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown command"));
}

#[test]
fn rejects_unexpected_arguments() {
    tube_remote()
        .arg("--frobnicate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn config_flag_needs_a_path() {
    tube_remote()
        .arg("--config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--config needs a path"));
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.yaml");
    tube_remote()
        .arg("--config")
        .arg(&path)
        .args(["send", "cc"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}
