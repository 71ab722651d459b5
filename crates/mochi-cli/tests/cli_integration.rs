//! Integration tests for CLI behavior.
//!
//! These drive the real binary with `MOCHI_HOME` pointed at a temporary
//! directory, so nothing touches `~/.mochi`.

use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Create a temporary MOCHI_HOME holding `config`.
/// Returns the TempDir (must be kept alive for the duration of the test).
fn setup_test_home(config: &str) -> TempDir {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    fs::write(temp_dir.path().join("config.toml"), config).expect("failed to write config.toml");
    temp_dir
}

fn mochi(home: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mochi"));
    cmd.env("MOCHI_HOME", home.path()).env_remove("MOCHI_LOG");
    cmd
}

fn run(home: &TempDir, args: &[&str]) -> Output {
    mochi(home).args(args).output().expect("failed to run mochi")
}

fn run_console(home: &TempDir, input: &str) -> Output {
    let mut child = mochi(home)
        .arg("console")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn mochi");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait for mochi")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// =============================================================================
// Argument parsing
// =============================================================================

#[test]
fn integration_help_flag() {
    let output = Command::new(env!("CARGO_BIN_EXE_mochi"))
        .arg("--help")
        .output()
        .expect("failed to run mochi");
    assert!(output.status.success());
    let text = stdout(&output);
    for sub in ["console", "exec", "decode", "tea"] {
        assert!(text.contains(sub), "help should mention {}: {}", sub, text);
    }
}

#[test]
fn integration_missing_subcommand_fails() {
    let home = setup_test_home("");
    let output = run(&home, &[]);
    assert!(!output.status.success());
}

// =============================================================================
// Commands
// =============================================================================

#[test]
fn integration_exec_help_lists_builtins() {
    let home = setup_test_home("");
    let output = run(&home, &["exec", "help"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("/help"), "{}", text);
    assert!(text.contains("/stop"), "{}", text);
    assert!(text.contains("/permission"), "{}", text);
}

#[test]
fn integration_exec_unknown_command_fails() {
    let home = setup_test_home("");
    let output = run(&home, &["exec", "/definitely-not-a-command"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown command"), "{}", stderr(&output));
}

#[test]
fn integration_config_prefix_and_grants() {
    let home = setup_test_home(
        r#"
command_prefix = "!"

[permissions.grants]
"console:*" = ["u10086"]
"#,
    );
    let output = run(&home, &["exec", "!perm", "pp", "u10086"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(
        stdout(&output).contains("console:* (granted to u10086)"),
        "{}",
        stdout(&output)
    );
}

#[test]
fn integration_invalid_config_is_reported() {
    let home = setup_test_home("command_prefix = \"\"\n");
    let output = run(&home, &["exec", "help"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("command prefix"), "{}", stderr(&output));
}

#[test]
fn integration_home_flag_overrides_env() {
    let env_home = setup_test_home("command_prefix = \"!\"\n");
    let flag_home = setup_test_home("");
    let output = mochi(&env_home)
        .args(["--home", flag_home.path().to_str().unwrap(), "exec", "/help"])
        .output()
        .expect("failed to run mochi");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn integration_console_runs_until_stop() {
    let home = setup_test_home("");
    let output = run_console(&home, "perm permit u1 console:*\n\nstop\nhelp\n");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("OK"), "{}", text);
    assert!(text.contains("Stopping."), "{}", text);
    // nothing after stop runs
    assert!(!text.contains("◆"), "{}", text);
}

#[test]
fn integration_console_reports_failures_and_continues() {
    let home = setup_test_home("");
    let output = run_console(&home, "nope\nperm permit u1\nperm lp\n");
    assert!(output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Unknown command"), "{}", err);
    assert!(stdout(&output).contains("*:*"), "{}", stdout(&output));
}

// =============================================================================
// Packet tools
// =============================================================================

#[test]
fn integration_tea_round_trip() {
    let home = setup_test_home("");
    let key = "00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F";
    let output = run(
        &home,
        &["tea", "decrypt", "--key", key, "c20963cbdb487759a36d2ff86db391e92c496b426f4af497"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "6D 6F 63 68 69 20 74 65 61");

    let output = run(&home, &["tea", "encrypt", "--key", key, "6d6f636869"]);
    assert!(output.status.success());
    let cipher = stdout(&output).trim().to_string();
    let output = run(&home, &["tea", "decrypt", "--key", key, &cipher]);
    assert_eq!(stdout(&output).trim(), "6D 6F 63 68 69");
}

#[test]
fn integration_decode_frames() {
    let home = setup_test_home("");
    let output = run(
        &home,
        &["decode", "02 37 13 00 58 00 01 3E 03 3F A2 00 00 00 03"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "Heartbeat");

    let output = run(
        &home,
        &["decode", "02 37 13 08 36 31 04 3E 03 3F A2 00 00 00 03"],
    );
    assert!(output.status.success());
    assert!(stdout(&output).contains("LoginFailed"), "{}", stdout(&output));

    let output = run(&home, &["decode", "02 37 13"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("raw: 02 37 13"), "{}", stderr(&output));
}
