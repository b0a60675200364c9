//! Error types for signer transports and the peer waiter.

use thiserror::Error;

/// Result type alias for waiter operations.
pub type Result<T> = std::result::Result<T, WaitError>;

/// Non-success outcomes of a single connect attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
	/// The signer must show its human an approval prompt first.
	///
	/// Not a failure: the caller is expected to poll with the same token.
	#[error("signer requires approval before granting a session")]
	ApprovalRequired {
		/// Page the human should open to approve (if the signer supplied one).
		approval_uri: Option<String>,
	},

	/// The signer explicitly declined.
	#[error("signer rejected the connection: {0}")]
	Rejected(String),

	/// The single-use secret was already consumed.
	#[error("connection secret already used: {0}")]
	Expired(String),

	/// Relay or network failure.
	#[error("transport error: {0}")]
	Transport(String),
}

impl ConnectError {
	/// Whether polling with the same token may still succeed.
	pub fn is_approval_required(&self) -> bool {
		matches!(self, ConnectError::ApprovalRequired { .. })
	}

	/// Whether the signer answered with a final refusal for this token.
	pub fn is_terminal_refusal(&self) -> bool {
		matches!(self, ConnectError::Rejected(_) | ConnectError::Expired(_))
	}
}

/// Errors returned by [`TransportWaiter::wait_for_peer`](crate::TransportWaiter::wait_for_peer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
	#[error(transparent)]
	Connect(#[from] ConnectError),

	/// The subscription was force-released while the call was in flight.
	///
	/// Whatever the transport returned afterwards has been discarded.
	#[error("subscription released before the signer answered")]
	Released,
}

impl WaitError {
	pub fn is_approval_required(&self) -> bool {
		matches!(self, WaitError::Connect(e) if e.is_approval_required())
	}
}

/// Failure reported by an [`Authenticator`](crate::Authenticator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthFailure {
	pub message: String,
}

impl AuthFailure {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}
}
