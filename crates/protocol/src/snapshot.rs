//! The outward view of a session.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::PeerIdentity;
use crate::stage::Stage;
use crate::token::TokenScheme;

/// Pending human approval on the signer side.
///
/// Present only while the session is [`Stage::AwaitingApproval`]. It stays in
/// place after polling runs out (`poll_attempt == max_poll_attempts`) so the
/// approval URI remains visible for a manual check, and is dropped once the
/// session leaves that stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
	/// Page the human should open to approve, when the signer supplied one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub approval_uri: Option<String>,
	/// Approval checks performed so far.
	pub poll_attempt: u32,
	pub max_poll_attempts: u32,
	pub poll_interval_ms: u64,
}

impl ApprovalRequest {
	/// True once the poller used up its attempts.
	pub fn is_exhausted(&self) -> bool {
		self.poll_attempt >= self.max_poll_attempts
	}
}

/// User-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
	/// Empty or malformed pasted connection string.
	InvalidInput,
	/// Relay or network failure before a peer was known.
	TransportError,
	/// The signer explicitly declined.
	RejectedError,
	/// The single-use secret was already consumed.
	ExpiredToken,
	/// A hard deadline was exceeded.
	TimeoutError,
	/// The authentication handshake failed after a peer was known.
	AuthenticateFailure,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ErrorKind::InvalidInput => "INVALID_INPUT",
			ErrorKind::TransportError => "TRANSPORT_ERROR",
			ErrorKind::RejectedError => "REJECTED_ERROR",
			ErrorKind::ExpiredToken => "EXPIRED_TOKEN",
			ErrorKind::TimeoutError => "TIMEOUT_ERROR",
			ErrorKind::AuthenticateFailure => "AUTHENTICATE_FAILURE",
		};
		f.write_str(name)
	}
}

/// What `retry()` will do from an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPath {
	/// The peer is known and its subscription is alive: re-run authentication.
	ResumeSigning,
	/// The session is discarded; a fresh connection string is needed.
	FreshToken,
}

/// Snapshot published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
	pub stage: Stage,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub scheme: Option<TokenScheme>,
	/// Direct-connect string to show as link/QR or hand to another app.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub connection_uri: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub peer: Option<PeerIdentity>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub approval: Option<ApprovalRequest>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_kind: Option<ErrorKind>,
	/// Stage that was current when the error occurred.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failed_stage: Option<Stage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub slow_warning: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retry: Option<RetryPath>,
}

impl ProgressSnapshot {
	pub fn is_error(&self) -> bool {
		self.stage == Stage::Error
	}
}
