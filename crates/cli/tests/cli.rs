//! End-to-end tests running the built `signer-link` binary.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

use serde_json::Value;

const CLIENT_KEY: &str = "0f2c53bf0d8e4a4c11d2e6a9a0f7b3c8e1d4f6a2b9c0d3e5f7a8b1c2d4e6f8a0";

fn binary() -> PathBuf {
	let mut path = std::env::current_exe().unwrap();
	path.pop();
	path.pop();
	path.push("signer-link");
	path
}

fn run(args: &[&str]) -> Output {
	Command::new(binary())
		.env_remove("RUST_LOG")
		.args(args)
		.output()
		.expect("failed to execute signer-link")
}

fn stdout_json(output: &Output) -> Value {
	let stdout = String::from_utf8_lossy(&output.stdout);
	serde_json::from_str(&stdout).unwrap_or_else(|_| panic!("stdout is not JSON: {stdout}"))
}

/// Config with short stage minimums so simulations finish quickly.
fn fast_config() -> tempfile::NamedTempFile {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	write!(file, r#"{{"stages": {{"connectedMs": 10, "signingMs": 10, "syncingMs": 10}}}}"#).unwrap();
	file
}

#[test]
fn uri_text_prints_the_connection_string() {
	let output = run(&[
		"uri",
		"--client-key",
		CLIENT_KEY,
		"--relay",
		"wss://relay.example",
		"--secret",
		"s3cr3t",
	]);
	assert!(output.status.success());

	let stdout = String::from_utf8_lossy(&output.stdout);
	let line = stdout.trim();
	assert!(line.starts_with(&format!("nostrconnect://{CLIENT_KEY}?")), "{line}");
	assert!(line.contains("secret=s3cr3t"));
	assert!(line.contains("relay=wss%3A%2F%2Frelay.example"));
}

#[test]
fn uri_json_envelope() {
	let output = run(&["-f", "json", "uri", "--client-key", CLIENT_KEY, "--relay", "wss://relay.example"]);
	assert!(output.status.success());

	let json = stdout_json(&output);
	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "uri");
	assert_eq!(json["data"]["relays"][0], "wss://relay.example");
	assert!(json["data"]["secret"].as_str().is_some_and(|s| !s.is_empty()));
}

#[test]
fn uri_with_a_bad_key_is_invalid_input() {
	let output = run(&["-f", "json", "uri", "--client-key", "nope", "--relay", "wss://relay.example"]);
	assert_eq!(output.status.code(), Some(1));

	let json = stdout_json(&output);
	assert_eq!(json["ok"], false);
	assert_eq!(json["command"], "uri");
	assert_eq!(json["error"]["code"], "INVALID_INPUT");
	assert!(String::from_utf8_lossy(&output.stderr).contains("INVALID_INPUT"));
}

#[test]
fn check_reports_signer_and_relays() {
	let bunker = format!("bunker://{}?relay=wss%3A%2F%2Frelay.example&secret=abc", "7e".repeat(32));
	let output = run(&["-f", "json", "check", &format!("  {bunker}\n")]);
	assert!(output.status.success());

	let json = stdout_json(&output);
	assert_eq!(json["data"]["scheme"], "bunker_url");
	assert_eq!(json["data"]["signer"], "7e".repeat(32));
	assert_eq!(json["data"]["relays"][0], "wss://relay.example");
	assert_eq!(json["data"]["hasSecret"], true);
}

#[test]
fn check_rejects_direct_connect_strings() {
	let output = run(&[
		"-f",
		"json",
		"check",
		&format!("nostrconnect://{CLIENT_KEY}?relay=wss%3A%2F%2Frelay.example"),
	]);
	assert_eq!(output.status.code(), Some(1));

	let json = stdout_json(&output);
	assert_eq!(json["error"]["code"], "INVALID_INPUT");
	assert!(json["error"]["message"].as_str().unwrap().contains("bunker"));
}

#[test]
fn simulate_streams_snapshots_as_ndjson() {
	let config = fast_config();
	let output = run(&["-f", "ndjson", "simulate", "--config", config.path().to_str().unwrap()]);
	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

	let lines: Vec<Value> = String::from_utf8_lossy(&output.stdout)
		.lines()
		.map(|line| serde_json::from_str(line).unwrap())
		.collect();
	let (envelope, snapshots) = lines.split_last().unwrap();

	let stages: Vec<&str> = snapshots.iter().map(|s| s["stage"].as_str().unwrap()).collect();
	assert_eq!(stages, vec!["waiting", "connected", "signing", "syncing", "complete"]);
	assert_eq!(envelope["ok"], true);
	assert_eq!(envelope["data"]["finalStage"], "complete");
	assert_eq!(envelope["data"]["connectCalls"], 1);
	assert!(envelope["data"].get("snapshots").is_none());
}

#[test]
fn simulate_failure_exits_non_zero_with_envelope() {
	let config = fast_config();
	let output = run(&[
		"-f",
		"json",
		"simulate",
		"--scenario",
		"rejected",
		"--config",
		config.path().to_str().unwrap(),
	]);
	assert_eq!(output.status.code(), Some(1));

	let json = stdout_json(&output);
	assert_eq!(json["ok"], false);
	assert_eq!(json["error"]["code"], "SESSION_FAILED");
	assert_eq!(json["error"]["details"]["errorKind"], "REJECTED_ERROR");
	assert_eq!(json["data"]["finalStage"], "error");
	assert_eq!(json["data"]["snapshots"].as_array().unwrap().len(), 2);
}

#[test]
fn simulate_cancel_after() {
	let config = fast_config();
	let output = run(&[
		"-f",
		"json",
		"simulate",
		"--scenario",
		"slow-auth",
		"--cancel-after-ms",
		"300",
		"--config",
		config.path().to_str().unwrap(),
	]);
	assert_eq!(output.status.code(), Some(1));

	let json = stdout_json(&output);
	assert_eq!(json["error"]["code"], "SESSION_CANCELLED");
	assert_eq!(json["data"]["finalStage"], "cancelled");
}

#[test]
fn simulate_with_invalid_config_is_config_error() {
	let mut config = tempfile::NamedTempFile::new().unwrap();
	write!(config, r#"{{"approval": {{"maxAttempts": 0}}}}"#).unwrap();

	let output = run(&["-f", "json", "simulate", "--config", config.path().to_str().unwrap()]);
	assert_eq!(output.status.code(), Some(1));

	let json = stdout_json(&output);
	assert_eq!(json["error"]["code"], "CONFIG_ERROR");
	assert!(json["error"]["message"].as_str().unwrap().contains("approval.maxAttempts"));
}

#[test]
fn simulate_stops_when_approval_polling_runs_out() {
	let mut script = tempfile::NamedTempFile::new().unwrap();
	write!(script, r#"{{"connect": [{{"outcome": {{"type": "approval_required"}}}}]}}"#).unwrap();
	let mut config = tempfile::NamedTempFile::new().unwrap();
	write!(config, r#"{{"approval": {{"intervalMs": 20, "maxAttempts": 3}}}}"#).unwrap();

	let output = run(&[
		"-f",
		"json",
		"simulate",
		"--script",
		script.path().to_str().unwrap(),
		"--config",
		config.path().to_str().unwrap(),
	]);
	assert_eq!(output.status.code(), Some(1));

	let json = stdout_json(&output);
	assert_eq!(json["error"]["code"], "SESSION_FAILED");
	assert_eq!(json["error"]["details"]["pollAttempts"], 3);
	assert_eq!(json["data"]["finalStage"], "cancelled");
	assert_eq!(json["data"]["connectCalls"], 4);
}
