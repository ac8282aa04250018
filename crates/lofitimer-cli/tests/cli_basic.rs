//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use std::io::Write;
use std::process::{Command, Stdio};

use tempfile::TempDir;

struct Cli {
    dir: TempDir,
}

impl Cli {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_lofitimer"));
        cmd.args(args)
            .env("LOFITIMER_DATA_DIR", self.dir.path())
            .env("RUST_LOG", "warn");
        cmd
    }

    /// Run a CLI command and return (stdout, stderr, exit code).
    fn run(&self, args: &[&str]) -> (String, String, i32) {
        let output = self
            .command(args)
            .output()
            .expect("Failed to execute CLI command");
        collect(output)
    }

    /// Run with `input` piped to stdin.
    fn run_with_input(&self, args: &[&str], input: &str) -> (String, String, i32) {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn CLI");
        child
            .stdin
            .take()
            .unwrap()
            .write_all(input.as_bytes())
            .unwrap();
        collect(child.wait_with_output().unwrap())
    }
}

fn collect(output: std::process::Output) -> (String, String, i32) {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);
    (stdout, stderr, code)
}

#[test]
fn test_duration_defaults_then_persists() {
    let cli = Cli::new();
    let (stdout, _, code) = cli.run(&["duration", "get"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "00:25:00");

    let (_, _, code) = cli.run(&["duration", "set", "1:02:03"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = cli.run(&["duration", "get", "--secs"]);
    assert_eq!(stdout.trim(), "3723");

    let file = std::fs::read_to_string(cli.dir.path().join("pomodoro.properties")).unwrap();
    assert!(file.contains("pomodoro_duration_seconds=3723"));
}

#[test]
fn test_duration_set_rejects_garbage() {
    let cli = Cli::new();
    let (_, stderr, code) = cli.run(&["duration", "set", "soon"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_stats_week_json_reads_ledger() {
    let cli = Cli::new();
    let today = chrono::Local::now().date_naive();
    std::fs::write(
        cli.dir.path().join("pomodoro.properties"),
        format!("session.{}=50,2\nsession.2001-01-01=9,9\n", today.format("%Y-%m-%d")),
    )
    .unwrap();

    let (stdout, _, code) = cli.run(&["stats", "week", "--json"]);
    assert_eq!(code, 0);
    let days: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(days.len(), 7);
    assert_eq!(days[6]["total_minutes"], 50);
    assert_eq!(days[6]["session_count"], 2);
    assert!(days[..6].iter().all(|d| d["session_count"] == 0));

    // Loading prunes the stale entry from disk.
    let file = std::fs::read_to_string(cli.dir.path().join("pomodoro.properties")).unwrap();
    assert!(!file.contains("2001-01-01"));
}

#[test]
fn test_stats_today_on_empty_ledger() {
    let cli = Cli::new();
    let (stdout, _, code) = cli.run(&["stats", "today", "--json"]);
    assert_eq!(code, 0);
    let today: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(today["total_minutes"], 0);
    assert_eq!(today["session_count"], 0);
}

#[test]
fn test_config_get_set() {
    let cli = Cli::new();
    let (stdout, _, code) = cli.run(&["config", "get", "timer.default_duration_secs"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "1500");

    let (_, _, code) = cli.run(&["config", "set", "timer.default_duration_secs", "600"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = cli.run(&["duration", "get", "--secs"]);
    assert_eq!(stdout.trim(), "600");

    let (_, _, code) = cli.run(&["config", "get", "timer.nope"]);
    assert_eq!(code, 1);
}

#[test]
fn test_config_list_is_json() {
    let cli = Cli::new();
    let (stdout, _, code) = cli.run(&["config", "list"]);
    assert_eq!(code, 0);
    let config: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(config["timer"]["visual_tick_ms"], 50);
}

#[test]
fn test_run_adjusts_and_reports_status() {
    let cli = Cli::new();
    let (stdout, _, code) = cli.run_with_input(&["run"], "+m\nstatus\nquit\n");
    assert_eq!(code, 0);
    let progress: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(progress["total_secs"], 1560);
    assert_eq!(progress["phase"], "configuring");

    let (stdout, _, _) = cli.run(&["duration", "get", "--secs"]);
    assert_eq!(stdout.trim(), "1560");
}

#[test]
fn test_run_with_duration_and_untracked() {
    let cli = Cli::new();
    let (stdout, _, code) =
        cli.run_with_input(&["run", "--duration", "0:30", "--untracked"], "status\n");
    assert_eq!(code, 0);
    let progress: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(progress["total_secs"], 30);
    assert_eq!(progress["countable"], false);
}

#[test]
fn test_run_reports_unknown_commands() {
    let cli = Cli::new();
    let (_, stderr, code) = cli.run_with_input(&["run"], "launch\nquit\n");
    assert_eq!(code, 0);
    assert!(stderr.contains("unknown command 'launch'"));
}
