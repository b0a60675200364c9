//! Run a connection attempt against a scripted signer.
//!
//! The state machine runs on the real tokio clock. Built-in scenarios use
//! the default [`ConnectConfig`] timings, so a full run takes a few seconds.


use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use signer_link::{
	ApprovalRequest, AuthProgress, ConnectConfig, ConnectUriBuilder, ConnectionStateMachine, ProgressSnapshot, SessionToken,
	Stage,
};
use signer_link_protocol::generate_secret;
use signer_link_runtime::{AuthOutcome, AuthScript, ConnectOutcome, ConnectStep, ScriptedSigner, SignerScript, SignerStats};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::cli::{Scenario, SimulateArgs};
use crate::error::{CliError, Result};
use crate::output::{
	CommandError, ErrorCode, OutputFormat, ResultBuilder, SimulateData, print_error_stderr, print_result, print_snapshot,
};

const DEMO_CLIENT_KEY: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";
const DEMO_SIGNER_KEY: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
const DEMO_RELAY: &str = "wss://relay.signer-link.invalid";

impl Scenario {
	pub fn label(self) -> &'static str {
		match self {
			Scenario::Instant => "instant",
			Scenario::Approval => "approval",
			Scenario::Rejected => "rejected",
			Scenario::SlowAuth => "slow-auth",
			Scenario::Expired => "expired",
		}
	}

	pub fn script(self) -> SignerScript {
		match self {
			Scenario::Instant => SignerScript::new().connect_step(ConnectStep::connected(1_000)).auth_script(
				AuthScript::instant()
					.step(100, AuthProgress::Signing)
					.step(1_200, AuthProgress::Complete),
			),
			Scenario::Approval => SignerScript::new()
				.connect_step(ConnectStep::approval(300, Some("https://signer.signer-link.invalid/approve")))
				.connect_step(ConnectStep::approval(0, None))
				.connect_step(ConnectStep::connected(0)),
			Scenario::Rejected => SignerScript::new().connect_step(ConnectStep::new(
				500,
				ConnectOutcome::Rejected {
					reason: "user declined the request".into(),
				},
			)),
			Scenario::SlowAuth => SignerScript::new().auth_script(
				AuthScript::instant()
					.step(0, AuthProgress::Signing)
					.finish_after(17_000)
					.outcome(AuthOutcome::Success),
			),
			Scenario::Expired => SignerScript::new().connect_step(ConnectStep::new(
				200,
				ConnectOutcome::Expired {
					reason: "secret already used".into(),
				},
			)),
		}
	}

	/// Scenarios that model a pasted signer-issued string.
	pub fn connection_string(self) -> Option<String> {
		match self {
			Scenario::Approval | Scenario::Rejected | Scenario::Expired => Some(format!(
				"bunker://{DEMO_SIGNER_KEY}?relay={DEMO_RELAY}&secret={}",
				generate_secret()
			)),
			Scenario::Instant | Scenario::SlowAuth => None,
		}
	}
}

/// Everything observed during one simulated session.
#[derive(Debug)]
pub struct SessionRun {
	pub label: String,
	pub last: ProgressSnapshot,
	pub snapshots: Vec<ProgressSnapshot>,
	pub stats: SignerStats,
	/// Approval state when polling ran out and the run gave up waiting.
	pub approval_timed_out: Option<ApprovalRequest>,
}

impl SessionRun {
	fn outcome_error(&self) -> Option<CommandError> {
		if let Some(ref approval) = self.approval_timed_out {
			return Some(CommandError {
				code: ErrorCode::SessionFailed,
				message: format!("signer did not approve after {} checks", approval.poll_attempt),
				details: Some(serde_json::json!({
					"stage": self.last.stage,
					"approvalUri": approval.approval_uri,
					"pollAttempts": approval.poll_attempt,
				})),
			});
		}
		let (code, default_message) = match self.last.stage {
			Stage::Complete => return None,
			Stage::Error => (ErrorCode::SessionFailed, "session failed"),
			Stage::Cancelled => (ErrorCode::SessionCancelled, "session cancelled"),
			_ => (ErrorCode::InternalError, "state machine stopped before the session ended"),
		};
		let details = serde_json::json!({
			"stage": self.last.stage,
			"errorKind": self.last.error_kind,
			"failedStage": self.last.failed_stage,
			"retry": self.last.retry,
		});
		Some(CommandError {
			code,
			message: self.last.message.clone().unwrap_or_else(|| default_message.to_string()),
			details: Some(details),
		})
	}
}

pub async fn execute(args: SimulateArgs, format: OutputFormat) -> Result<()> {
	let started = std::time::Instant::now();
	let run = run_session(&args, format).await?;

	let error = run.outcome_error();
	let data = SimulateData {
		scenario: run.label,
		final_stage: run.last.stage,
		connect_calls: run.stats.connect_calls,
		auth_calls: run.stats.auth_calls,
		snapshots: if format == OutputFormat::Json { run.snapshots } else { Vec::new() },
	};

	let mut builder = ResultBuilder::new("simulate").started_at(started).data(data);
	if let Some(ref error) = error {
		builder = builder.command_error(error.clone());
	}
	print_result(&builder.build(), format);

	match error {
		None => Ok(()),
		Some(error) => {
			print_error_stderr(&error);
			Err(CliError::OutputAlreadyPrinted)
		}
	}
}

/// Drives one session to `Complete`, `Error` or `Cancelled`, printing each
/// snapshot as it arrives. A session whose approval polling runs out is
/// cancelled, since a simulation has no human to approve it.
pub async fn run_session(args: &SimulateArgs, format: OutputFormat) -> Result<SessionRun> {
	let mut config = match args.config {
		Some(ref path) => ConnectConfig::from_file(path)?,
		None => ConnectConfig::default(),
	};
	if let Some(environment) = args.environment {
		config = config.with_environment(environment.into());
	}

	let (label, script) = match args.script {
		Some(ref path) => {
			let script = SignerScript::from_file(path)
				.with_context(|| format!("failed to load signer script {}", path.display()))
				.map_err(CliError::Script)?;
			(path.display().to_string(), script)
		}
		None => (args.scenario.label().to_string(), args.scenario.script()),
	};

	let connection_string = match (&args.connection_string, &args.script) {
		(Some(raw), _) => Some(raw.clone()),
		(None, Some(_)) => None,
		(None, None) => args.scenario.connection_string(),
	};

	let signer = Arc::new(ScriptedSigner::new(script));
	let (machine, mut snapshots) = ConnectionStateMachine::spawn(config, signer.clone(), signer.clone())?;
	info!(target = "signer_link_cli", scenario = %label, "simulating session");

	match connection_string {
		Some(raw) => machine.submit_connection_string(raw)?,
		None => machine.start(demo_token()?)?,
	}

	let began = Instant::now();
	let mut cancel_at = args.cancel_after_ms.map(|ms| began + Duration::from_millis(ms));
	let mut engaged = false;
	let mut approval_timed_out = None;
	let mut collected = Vec::new();

	loop {
		let snapshot = tokio::select! {
			next = snapshots.recv() => match next {
				Some(snapshot) => snapshot,
				None => break,
			},
			_ = until(cancel_at) => {
				debug!(target = "signer_link_cli", "cancelling on request");
				cancel_at = None;
				machine.cancel()?;
				continue;
			}
		};

		print_snapshot(began.elapsed(), &snapshot, format);
		let stage = snapshot.stage;
		let awaiting_user = stage == Stage::Idle && snapshot.connection_uri.is_some() && snapshot.retry.is_none();
		let exhausted = match snapshot.approval {
			Some(ref approval) if stage == Stage::AwaitingApproval && approval.is_exhausted() => Some(approval.clone()),
			_ => None,
		};
		collected.push(snapshot);

		if stage.is_terminal() || stage == Stage::Error {
			break;
		}
		// Nobody is left to approve or press "check again"; stop instead of idling forever.
		if let Some(approval) = exhausted {
			if approval_timed_out.is_none() {
				info!(target = "signer_link_cli", attempts = approval.poll_attempt, "approval polling ran out; giving up");
				approval_timed_out = Some(approval);
				machine.cancel()?;
			}
			continue;
		}
		if awaiting_user && !engaged {
			debug!(target = "signer_link_cli", "engaging pending session");
			engaged = true;
			machine.engage()?;
		}
	}

	Ok(SessionRun {
		label,
		last: collected.last().cloned().unwrap_or_default(),
		snapshots: collected,
		stats: signer.stats(),
		approval_timed_out,
	})
}

fn demo_token() -> Result<SessionToken> {
	Ok(ConnectUriBuilder::new(DEMO_CLIENT_KEY)
		.relay(DEMO_RELAY)
		.name("signer-link simulate")
		.perm("sign_event:22242")
		.build()?)
}

async fn until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}
