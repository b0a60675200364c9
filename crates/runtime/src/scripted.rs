//! In-memory signer driven by a script.
//!
//! [`ScriptedSigner`] implements both [`SignerTransport`] and
//! [`Authenticator`] from a [`SignerScript`], sleeping on the tokio clock so
//! paused-time tests and the CLI simulator behave identically. It records
//! call counts and subscription bookkeeping for assertions.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use signer_link_protocol::{AuthProgress, PeerIdentity, SessionToken};
use tracing::debug;

use crate::error::{AuthFailure, ConnectError};
use crate::transport::{AuthRequest, Authenticator, SignerTransport};

/// Behaviour of a scripted signer.
///
/// `connect` and `authenticate` entries are consumed one per call; once the
/// list runs out the last entry repeats. Empty lists mean "succeed at once".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignerScript {
	/// Public key reported on successful connects.
	pub peer: String,
	pub connect: Vec<ConnectStep>,
	pub authenticate: Vec<AuthScript>,
}

impl Default for SignerScript {
	fn default() -> Self {
		Self {
			peer: "5c".repeat(32),
			connect: Vec::new(),
			authenticate: Vec::new(),
		}
	}
}

impl SignerScript {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn connect_step(mut self, step: ConnectStep) -> Self {
		self.connect.push(step);
		self
	}

	pub fn auth_script(mut self, script: AuthScript) -> Self {
		self.authenticate.push(script);
		self
	}

	pub fn from_json(json: &str) -> serde_json::Result<Self> {
		serde_json::from_str(json)
	}

	pub fn from_file(path: &Path) -> std::io::Result<Self> {
		let content = std::fs::read_to_string(path)?;
		Self::from_json(&content).map_err(std::io::Error::other)
	}
}

/// One scripted answer to a connect call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectStep {
	#[serde(default)]
	pub delay_ms: u64,
	pub outcome: ConnectOutcome,
}

impl ConnectStep {
	pub fn new(delay_ms: u64, outcome: ConnectOutcome) -> Self {
		Self { delay_ms, outcome }
	}

	pub fn connected(delay_ms: u64) -> Self {
		Self::new(delay_ms, ConnectOutcome::Connected)
	}

	pub fn approval(delay_ms: u64, approval_uri: Option<&str>) -> Self {
		Self::new(
			delay_ms,
			ConnectOutcome::ApprovalRequired {
				approval_uri: approval_uri.map(str::to_string),
			},
		)
	}

	pub fn hang() -> Self {
		Self::new(0, ConnectOutcome::Hang)
	}
}

/// Scripted connect result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectOutcome {
	Connected,
	ApprovalRequired {
		#[serde(default, rename = "approvalUri")]
		approval_uri: Option<String>,
	},
	Rejected {
		reason: String,
	},
	Expired {
		reason: String,
	},
	TransportError {
		message: String,
	},
	/// Never answers.
	Hang,
}

/// Scripted behaviour of one authenticate call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthScript {
	pub steps: Vec<AuthStep>,
	/// Delay between the last step and the result.
	pub finish_delay_ms: u64,
	pub outcome: AuthOutcome,
}

impl AuthScript {
	/// Returns success immediately, without progress reports.
	pub fn instant() -> Self {
		Self::default()
	}

	pub fn step(mut self, delay_ms: u64, progress: AuthProgress) -> Self {
		self.steps.push(AuthStep {
			delay_ms,
			progress,
			message: None,
		});
		self
	}

	pub fn finish_after(mut self, delay_ms: u64) -> Self {
		self.finish_delay_ms = delay_ms;
		self
	}

	pub fn outcome(mut self, outcome: AuthOutcome) -> Self {
		self.outcome = outcome;
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStep {
	#[serde(default)]
	pub delay_ms: u64,
	pub progress: AuthProgress,
	#[serde(default)]
	pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthOutcome {
	#[default]
	Success,
	Failure {
		message: String,
	},
	/// Never returns.
	Hang,
}

/// Counters exposed for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignerStats {
	pub connect_calls: u32,
	pub auth_calls: u32,
	pub releases: u32,
	pub live_subscriptions: usize,
	pub max_live_subscriptions: usize,
}

#[derive(Debug)]
struct ScriptState {
	stats: SignerStats,
	open: Vec<String>,
	relay_alive: bool,
	last_auth_timeout: Option<Duration>,
}

/// Scripted signer implementing both collaborator traits.
#[derive(Debug)]
pub struct ScriptedSigner {
	script: SignerScript,
	state: Mutex<ScriptState>,
}

impl ScriptedSigner {
	pub fn new(script: SignerScript) -> Self {
		Self {
			script,
			state: Mutex::new(ScriptState {
				stats: SignerStats::default(),
				open: Vec::new(),
				relay_alive: true,
				last_auth_timeout: None,
			}),
		}
	}

	pub fn stats(&self) -> SignerStats {
		let state = self.state.lock();
		SignerStats {
			live_subscriptions: state.open.len(),
			..state.stats
		}
	}

	/// Simulates the relay connection dropping (or coming back).
	pub fn set_relay_alive(&self, alive: bool) {
		self.state.lock().relay_alive = alive;
	}

	/// Timeout passed with the most recent authenticate call.
	pub fn last_auth_timeout(&self) -> Option<Duration> {
		self.state.lock().last_auth_timeout
	}

	pub fn peer(&self) -> PeerIdentity {
		PeerIdentity::new(self.script.peer.clone())
	}

	fn pick<T: Clone>(items: &[T], call: u32) -> Option<T> {
		let index = (call as usize).saturating_sub(1).min(items.len().saturating_sub(1));
		items.get(index).cloned()
	}
}

#[async_trait]
impl SignerTransport for ScriptedSigner {
	async fn connect(&self, token: &SessionToken) -> Result<PeerIdentity, ConnectError> {
		let step = {
			let mut state = self.state.lock();
			state.stats.connect_calls += 1;
			state.open.push(token.raw().to_string());
			state.stats.max_live_subscriptions = state.stats.max_live_subscriptions.max(state.open.len());
			Self::pick(&self.script.connect, state.stats.connect_calls)
		};
		let step = step.unwrap_or_else(|| ConnectStep::connected(0));
		debug!(delay_ms = step.delay_ms, outcome = ?step.outcome, "scripted connect");

		delay_for(step.delay_ms).await;

		match step.outcome {
			ConnectOutcome::Connected => Ok(self.peer()),
			ConnectOutcome::ApprovalRequired { approval_uri } => Err(ConnectError::ApprovalRequired { approval_uri }),
			ConnectOutcome::Rejected { reason } => Err(ConnectError::Rejected(reason)),
			ConnectOutcome::Expired { reason } => Err(ConnectError::Expired(reason)),
			ConnectOutcome::TransportError { message } => Err(ConnectError::Transport(message)),
			ConnectOutcome::Hang => std::future::pending().await,
		}
	}

	fn release(&self, token: &SessionToken) {
		let mut state = self.state.lock();
		if let Some(pos) = state.open.iter().position(|raw| raw == token.raw()) {
			state.open.remove(pos);
			state.stats.releases += 1;
		}
	}

	fn is_alive(&self) -> bool {
		let state = self.state.lock();
		state.relay_alive && !state.open.is_empty()
	}
}

#[async_trait]
impl Authenticator for ScriptedSigner {
	async fn authenticate(&self, peer: &PeerIdentity, request: AuthRequest) -> Result<(), AuthFailure> {
		let script = {
			let mut state = self.state.lock();
			state.stats.auth_calls += 1;
			state.last_auth_timeout = Some(request.timeout);
			Self::pick(&self.script.authenticate, state.stats.auth_calls)
		};
		let script = script.unwrap_or_default();
		debug!(peer = %peer.short(), steps = script.steps.len(), "scripted authenticate");

		for step in &script.steps {
			delay_for(step.delay_ms).await;
			request.progress.report(step.progress, step.message.as_deref());
		}
		delay_for(script.finish_delay_ms).await;

		match script.outcome {
			AuthOutcome::Success => Ok(()),
			AuthOutcome::Failure { message } => Err(AuthFailure::new(message)),
			AuthOutcome::Hang => std::future::pending().await,
		}
	}
}

async fn delay_for(ms: u64) {
	if ms > 0 {
		tokio::time::sleep(Duration::from_millis(ms)).await;
	}
}
