//! Error types for the connection state machine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for state machine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`ConnectionStateMachine`](crate::ConnectionStateMachine) handles.
///
/// Session failures are not errors here: they are published as
/// [`ProgressSnapshot`](signer_link_protocol::ProgressSnapshot)s.
#[derive(Debug, Error)]
pub enum Error {
	/// The driver task is gone; no further commands are accepted.
	#[error("connection state machine has stopped")]
	Stopped,

	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Invalid or unreadable [`ConnectConfig`](crate::ConnectConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_json::Error),

	/// A duration or count that must be positive was zero.
	#[error("{field} must be greater than zero")]
	Zero { field: &'static str },
}
