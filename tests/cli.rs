use assert_cmd::prelude::*;
use predicates::str::contains;
use std::process::Command;

#[test]
fn unknown_argument_prints_usage() {
    let mut cmd = Command::cargo_bin("sphere-compute").expect("binary exists");
    cmd.arg("--bogus");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"))
        .stderr(contains("Usage: sphere-compute"));
}

#[test]
fn missing_flag_value_is_an_error() {
    let mut cmd = Command::cargo_bin("sphere-compute").expect("binary exists");
    cmd.args(["--headless", "--frames"]);
    cmd.assert()
        .failure()
        .stderr(contains("--frames expects a value"));
}

#[test]
fn non_numeric_value_is_an_error() {
    let mut cmd = Command::cargo_bin("sphere-compute").expect("binary exists");
    cmd.args(["--spheres", "many"]);
    cmd.assert()
        .failure()
        .stderr(contains("invalid value for --spheres: many"));
}

#[test]
fn zero_pixel_size_is_rejected_before_rendering() {
    let mut cmd = Command::cargo_bin("sphere-compute").expect("binary exists");
    cmd.args(["--headless", "--pixel-size", "0"]);
    cmd.assert()
        .failure()
        .stderr(contains("invalid configuration"))
        .stderr(contains("pixel size must be at least 1"));
}

#[test]
fn help_prints_usage_and_succeeds() {
    let mut cmd = Command::cargo_bin("sphere-compute").expect("binary exists");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(contains("Usage: sphere-compute"));
}
