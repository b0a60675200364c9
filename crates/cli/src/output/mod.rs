//! Structured output envelope for all CLI commands.
//!
//! Every command produces a result envelope on stdout:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "ok": true,
//!   "command": "check",
//!   "data": { ... },
//!   "timings": { "durationMs": 3 }
//! }
//! ```
//!
//! On failure `data` is replaced (or, for `simulate`, accompanied) by
//! `error: { code, message, details }`.

#[cfg(test)]
mod tests;

use std::io::{self, Write};
use std::time::{Duration, Instant};

use colored::Colorize;
use serde::{Deserialize, Serialize};
use signer_link::{ProgressSnapshot, RetryPath, Stage, TokenScheme};

/// Current schema version for command output.
pub const SCHEMA_VERSION: u32 = 1;

/// Output format for CLI results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON output
	Json,
	/// Newline-delimited JSON (streaming)
	Ndjson,
}

impl std::str::FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"text" => Ok(OutputFormat::Text),
			"json" => Ok(OutputFormat::Json),
			"ndjson" => Ok(OutputFormat::Ndjson),
			_ => Err(format!("unknown format: {s}")),
		}
	}
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
			OutputFormat::Ndjson => write!(f, "ndjson"),
		}
	}
}

/// The result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema_version: Option<u32>,

	/// Whether the command succeeded
	pub ok: bool,

	/// Command name ("uri", "check", "simulate")
	pub command: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

/// Structured error information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Malformed connection string or client key
	InvalidInput,
	/// Configuration or signer script could not be loaded
	ConfigError,
	/// Simulated session ended in an error
	SessionFailed,
	/// Simulated session was cancelled before completing
	SessionCancelled,
	InternalError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::ConfigError => "CONFIG_ERROR",
			ErrorCode::SessionFailed => "SESSION_FAILED",
			ErrorCode::SessionCancelled => "SESSION_CANCELLED",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		};
		write!(f, "{s}")
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

impl From<Duration> for Timings {
	fn from(d: Duration) -> Self {
		Self {
			duration_ms: d.as_millis() as u64,
		}
	}
}

/// Data for the `uri` command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UriData {
	pub uri: String,
	pub relays: Vec<String>,
	pub secret: Option<String>,
}

/// Data for the `check` command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckData {
	pub scheme: TokenScheme,
	pub signer: String,
	pub relays: Vec<String>,
	pub has_secret: bool,
}

/// Data for the `simulate` command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateData {
	pub scenario: String,
	pub final_stage: Stage,
	pub connect_calls: u32,
	pub auth_calls: u32,
	/// Every published snapshot, omitted when they were streamed.
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub snapshots: Vec<ProgressSnapshot>,
}

/// Builder for constructing command results
pub struct ResultBuilder<T: Serialize> {
	command: String,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			error: None,
			start_time: Instant::now(),
		}
	}

	/// Measure the duration from `start` instead of from construction.
	pub fn started_at(mut self, start: Instant) -> Self {
		self.start_time = start;
		self
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
			details: None,
		});
		self
	}

	pub fn command_error(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	pub fn build(self) -> CommandResult<T> {
		let ok = self.error.is_none() && self.data.is_some();
		CommandResult {
			schema_version: Some(SCHEMA_VERSION),
			ok,
			command: self.command,
			data: self.data,
			error: self.error,
			timings: Some(Timings::from(self.start_time.elapsed())),
		}
	}
}

/// Print a command result to stdout in the specified format
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	match format {
		OutputFormat::Json => {
			if let Ok(json) = serde_json::to_string_pretty(result) {
				println!("{json}");
			}
		}
		OutputFormat::Ndjson => {
			if let Ok(json) = serde_json::to_string(result) {
				println!("{json}");
			}
		}
		OutputFormat::Text => print_result_text(result),
	}
}

fn print_result_text<T: Serialize>(result: &CommandResult<T>) {
	let mut stdout = io::stdout().lock();

	if let Some(ref data) = result.data {
		if let Ok(json) = serde_json::to_string_pretty(data) {
			let _ = writeln!(stdout, "{json}");
		}
	}
	if let Some(ref error) = result.error {
		let _ = writeln!(stdout, "Error [{}]: {}", error.code, error.message);
		if let Some(ref details) = error.details {
			if let Ok(json) = serde_json::to_string_pretty(details) {
				let _ = writeln!(stdout, "Details: {json}");
			}
		}
	}
}

/// Print one snapshot as it is published.
///
/// NDJSON writes the raw snapshot; text writes a single colored line. JSON
/// prints nothing here since snapshots travel inside the final envelope.
pub fn print_snapshot(elapsed: Duration, snapshot: &ProgressSnapshot, format: OutputFormat) {
	match format {
		OutputFormat::Ndjson => {
			if let Ok(json) = serde_json::to_string(snapshot) {
				println!("{json}");
			}
		}
		OutputFormat::Text => println!("{}", snapshot_line(elapsed, snapshot)),
		OutputFormat::Json => {}
	}
}

/// Human-readable rendering of a snapshot.
pub fn snapshot_line(elapsed: Duration, snapshot: &ProgressSnapshot) -> String {
	let stage = match snapshot.stage {
		Stage::Complete => snapshot.stage.to_string().green().bold(),
		Stage::Error => snapshot.stage.to_string().red().bold(),
		Stage::Cancelled => snapshot.stage.to_string().yellow().bold(),
		stage => stage.to_string().cyan(),
	};
	let mut line = format!("{:>7}ms  {stage}", elapsed.as_millis());

	if let Some(ref peer) = snapshot.peer {
		line.push_str(&format!("  peer={}", peer.short()));
	}
	if let Some(ref approval) = snapshot.approval {
		line.push_str(&format!("  poll={}/{}", approval.poll_attempt, approval.max_poll_attempts));
		if let Some(ref uri) = approval.approval_uri {
			line.push_str(&format!("  approve at {uri}"));
		}
	}
	if snapshot.stage == Stage::Idle {
		if let Some(ref uri) = snapshot.connection_uri {
			line.push_str(&format!("  open {uri}"));
		}
	}
	if let Some(kind) = snapshot.error_kind {
		line.push_str(&format!("  [{kind}]"));
	}
	if let Some(ref message) = snapshot.message {
		line.push_str(&format!("  {message}"));
	}
	if snapshot.slow_warning {
		line.push_str(&format!("  {}", "taking longer than usual".yellow()));
	}
	match snapshot.retry {
		Some(RetryPath::ResumeSigning) => line.push_str("  (retry resumes signing)"),
		Some(RetryPath::FreshToken) => line.push_str("  (retry needs a new connection string)"),
		None => {}
	}
	line
}

/// Print an error to stderr in human-readable format
pub fn print_error_stderr(error: &CommandError) {
	eprintln!("{} [{}]: {}", "Error".red().bold(), error.code, error.message);
}
