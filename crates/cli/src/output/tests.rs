use signer_link::{ApprovalRequest, ErrorKind, PeerIdentity, TokenScheme};

use super::*;

#[test]
fn result_builder_success() {
	let result: CommandResult<CheckData> = ResultBuilder::new("check")
		.data(CheckData {
			scheme: TokenScheme::BunkerUrl,
			signer: "ab".repeat(32),
			relays: vec!["wss://relay.example".into()],
			has_secret: true,
		})
		.build();

	assert!(result.ok);
	assert_eq!(result.command, "check");
	assert_eq!(result.schema_version, Some(SCHEMA_VERSION));
	assert!(result.error.is_none());
}

#[test]
fn result_builder_error_is_not_ok_even_with_data() {
	let result: CommandResult<SimulateData> = ResultBuilder::new("simulate")
		.data(SimulateData {
			scenario: "rejected".into(),
			final_stage: Stage::Error,
			connect_calls: 1,
			auth_calls: 0,
			snapshots: Vec::new(),
		})
		.error(ErrorCode::SessionFailed, "signer rejected the connection")
		.build();

	assert!(!result.ok);
	assert!(result.data.is_some());
	assert_eq!(result.error.as_ref().unwrap().code, ErrorCode::SessionFailed);
}

#[test]
fn envelope_is_camel_case() {
	let result: CommandResult<SimulateData> = ResultBuilder::new("simulate")
		.data(SimulateData {
			scenario: "instant".into(),
			final_stage: Stage::Complete,
			connect_calls: 1,
			auth_calls: 1,
			snapshots: Vec::new(),
		})
		.build();

	let json = serde_json::to_value(&result).unwrap();
	assert_eq!(json["schemaVersion"], 1);
	assert_eq!(json["data"]["finalStage"], "complete");
	assert_eq!(json["data"]["connectCalls"], 1);
	assert!(json["data"].get("snapshots").is_none());
	assert!(json["timings"]["durationMs"].is_u64());
}

#[test]
fn error_code_display_matches_serde() {
	for code in [
		ErrorCode::InvalidInput,
		ErrorCode::ConfigError,
		ErrorCode::SessionFailed,
		ErrorCode::SessionCancelled,
		ErrorCode::InternalError,
	] {
		let json = serde_json::to_value(code).unwrap();
		assert_eq!(json.as_str(), Some(code.to_string().as_str()));
	}
}

#[test]
fn output_format_from_str() {
	assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
	assert_eq!("ndjson".parse::<OutputFormat>().unwrap(), OutputFormat::Ndjson);
	assert!("toml".parse::<OutputFormat>().is_err());
	assert_eq!(OutputFormat::default().to_string(), "text");
}

#[test]
fn snapshot_line_shows_approval_and_error_details() {
	colored::control::set_override(false);

	let pending = ProgressSnapshot {
		stage: Stage::AwaitingApproval,
		approval: Some(ApprovalRequest {
			approval_uri: Some("https://signer.example/ok".into()),
			poll_attempt: 2,
			max_poll_attempts: 30,
			poll_interval_ms: 4_000,
		}),
		..Default::default()
	};
	let line = snapshot_line(Duration::from_millis(8_000), &pending);
	assert!(line.contains("awaiting_approval"));
	assert!(line.contains("poll=2/30"));
	assert!(line.contains("approve at https://signer.example/ok"));

	let failed = ProgressSnapshot {
		stage: Stage::Error,
		peer: Some(PeerIdentity::new("5c".repeat(32))),
		error_kind: Some(ErrorKind::TimeoutError),
		message: Some("authentication timed out".into()),
		retry: Some(RetryPath::ResumeSigning),
		..Default::default()
	};
	let line = snapshot_line(Duration::from_millis(30_000), &failed);
	assert!(line.starts_with("  30000ms  error"));
	assert!(line.contains("[TIMEOUT_ERROR]"));
	assert!(line.contains("retry resumes signing"));
}
