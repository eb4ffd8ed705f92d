use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

#[test]
fn prints_version() {
    Command::new(env!("CARGO_BIN_EXE_prarang-tui"))
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::new(env!("CARGO_BIN_EXE_prarang-tui"))
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("prarang-tui").and(contains("--version")));
}
