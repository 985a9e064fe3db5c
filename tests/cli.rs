//! Runs the `rv32-sim` binary against small hex files.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use rvsim::asm::format_hex;
use rvsim::assemble_program;

fn write_temp_file(prefix: &str, contents: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("rv32-sim-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = dir.join(format!("{}-{}.hex", prefix, nonce));
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

fn write_program(prefix: &str, source: &str) -> PathBuf {
    let program = assemble_program(source).expect("Failed to assemble");
    write_temp_file(prefix, &format_hex(&program))
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rv32-sim"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_prints_a0_a1_pair() {
    let path = write_program("pair", "ori a0, zero, 5\nori a1, zero, -3");

    let output = run(&["run", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "(5,-3)\n");
}

#[test]
fn test_long_program_runs_to_completion() {
    let path = write_program(
        "long",
        r#"
            ori  a1, zero, 1
            lui  t2, 0x4
        loop:
            beq  a0, t2, done
            add  a0, a0, a1
            jal  zero, loop
        done:
        "#,
    );

    let output = run(&["run", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "(16384,1)\n");
}

#[test]
fn test_missing_file_fails_without_output() {
    let mut path = std::env::temp_dir();
    path.push("rv32-sim-tests");
    path.push("does-not-exist.hex");

    let output = run(&["run", path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_malformed_file_fails_without_output() {
    let path = write_temp_file("malformed", "13\nzz\n");

    let output = run(&["run", path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 2"));
}

#[test]
fn test_memory_fault_still_prints_registers() {
    let path = write_program(
        "fault",
        r#"
            ori  a0, zero, 7
            lui  t0, 0x1
            lw   a1, 0(t0)
            ori  a0, zero, 8
        "#,
    );

    let output = run(&["run", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "(7,0)\n");
}

#[test]
fn test_cycle_limit_fails_without_result_line() {
    let path = write_program("spin", "ori a0, zero, 1\njal zero, 0");

    let output = run(&["run", path.to_str().unwrap(), "--max-cycles", "50"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_json_report_names_stop_reason() {
    let path = write_program("json", "ori a0, zero, 9");

    let output = run(&["run", path.to_str().unwrap(), "--json"]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["a0"], 9);
    assert_eq!(report["stop"], "end_of_program");
    assert_eq!(report["cycles"], 1);
}
