// tests/cli.rs
//! Smoke tests for the `snex` binary.

use std::path::PathBuf;
use std::process::Command;

fn snex() -> Command {
    Command::new(env!("CARGO_BIN_EXE_snex"))
}

fn write_source(name: &str, source: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("snex-cli-{}-{}", std::process::id(), name));
    std::fs::write(&path, source).expect("failed to write test source");
    path
}

#[test]
fn eval_prints_the_value() {
    let output = snex()
        .args(["eval", "input * 4.0 - 1.0", "--input", "0.5"])
        .output()
        .expect("failed to run snex");
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1");
}

#[test]
fn check_fails_on_syntax_errors() {
    let good = write_source("good.snex", "int f(int x) { return x + 1; }\n");
    let bad = write_source("bad.snex", "int f(int x) { return x + 1 }\n");

    let ok = snex().arg("check").arg(&good).output().expect("failed to run snex");
    assert!(ok.status.success(), "{:?}", ok);

    let failed = snex()
        .args(["--color", "never", "check"])
        .arg(&bad)
        .output()
        .expect("failed to run snex");
    assert!(!failed.status.success());
    assert!(String::from_utf8_lossy(&failed.stderr).contains("E1005"));
}

#[test]
fn run_processes_an_impulse() {
    let path = write_source(
        "gain.snex",
        "float processSample(float input) { return input * 0.5f; }\n",
    );
    let output = snex()
        .arg("run")
        .arg(&path)
        .args(["--frames", "3"])
        .output()
        .expect("failed to run snex");
    assert!(output.status.success(), "{:?}", output);
    let lines: Vec<String> = String::from_utf8_lossy(&output.stdout).lines().map(str::to_string).collect();
    assert_eq!(lines, ["0.500000", "0.000000", "0.000000"]);
}
