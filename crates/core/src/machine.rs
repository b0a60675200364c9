//! The connection state machine handle.
//!
//! [`ConnectionStateMachine::spawn`] starts a driver task that owns every
//! piece of session state. The handle only sends commands; progress comes
//! back as [`ProgressSnapshot`]s on the returned [`Snapshots`] receiver.
//!
//! # Example
//!
//! ```ignore
//! let (machine, mut snapshots) = ConnectionStateMachine::spawn(config, transport, authenticator)?;
//! machine.submit_connection_string(pasted)?;
//! while let Some(snapshot) = snapshots.recv().await {
//!     render(&snapshot);
//! }
//! ```

mod driver;

use std::sync::Arc;

use signer_link_protocol::{ProgressSnapshot, SessionToken};
use signer_link_runtime::{Authenticator, SignerTransport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ConnectConfig;
use crate::error::{Error, Result};
use driver::Driver;

/// Stream of published snapshots, one per transition.
pub type Snapshots = mpsc::UnboundedReceiver<ProgressSnapshot>;

#[derive(Debug)]
enum Command {
	Start(SessionToken),
	Engage,
	Submit(String),
	CheckApproval,
	Retry,
	Cancel,
}

/// Handle to a running connection state machine.
///
/// Commands are queued and applied in order by the driver task. Dropping the
/// handle tears the session down without publishing anything further.
#[derive(Debug)]
pub struct ConnectionStateMachine {
	commands: mpsc::UnboundedSender<Command>,
	task: JoinHandle<()>,
}

impl ConnectionStateMachine {
	/// Validates `config` and starts the driver task.
	pub fn spawn(
		config: ConnectConfig,
		transport: Arc<dyn SignerTransport>,
		authenticator: Arc<dyn Authenticator>,
	) -> Result<(Self, Snapshots)> {
		config.validate()?;
		let (commands, command_rx) = mpsc::unbounded_channel();
		let (snapshot_tx, snapshots) = mpsc::unbounded_channel();
		let driver = Driver::new(config, transport, authenticator, snapshot_tx);
		let task = tokio::spawn(driver.run(command_rx));
		Ok((Self { commands, task }, snapshots))
	}

	/// Begins a session for a locally generated token.
	///
	/// On [`Environment::Desktop`](crate::Environment::Desktop) waiting starts
	/// at once. Elsewhere the session stays `Idle`, exposing its connection
	/// URI, until [`engage`](Self::engage).
	pub fn start(&self, token: SessionToken) -> Result<()> {
		self.send(Command::Start(token))
	}

	/// The user acted on a pending direct-connect session; start waiting.
	pub fn engage(&self) -> Result<()> {
		self.send(Command::Engage)
	}

	/// Begins a session for a pasted signer-issued connection string.
	pub fn submit_connection_string(&self, raw: impl Into<String>) -> Result<()> {
		self.send(Command::Submit(raw.into()))
	}

	/// Probes the signer now instead of waiting for the next poll.
	pub fn check_approval(&self) -> Result<()> {
		self.send(Command::CheckApproval)
	}

	/// Resumes at `Signing` when the peer's subscription is still usable,
	/// otherwise discards the session and returns to `Idle`.
	pub fn retry(&self) -> Result<()> {
		self.send(Command::Retry)
	}

	/// Tears everything down and publishes a final `Cancelled` snapshot.
	pub fn cancel(&self) -> Result<()> {
		self.send(Command::Cancel)
	}

	pub fn is_running(&self) -> bool {
		!self.task.is_finished()
	}

	fn send(&self, command: Command) -> Result<()> {
		self.commands.send(command).map_err(|_| Error::Stopped)
	}
}

impl Drop for ConnectionStateMachine {
	fn drop(&mut self) {
		self.task.abort();
	}
}
