//! Session establishment with a remote signer.
//!
//! A user logs in by letting a remote signer hold the key. This crate runs
//! the connection attempt from the connection string to an authenticated
//! session:
//!
//! - [`ConnectionStateMachine`] - the orchestrator and only source of
//!   [`ProgressSnapshot`]s
//! - [`ApprovalPoller`] - bounded re-probing while the signer waits for a human
//! - [`StageSequencer`] - paced `Connected → Signing → Syncing → Complete` walk
//! - [`TimeoutSupervisor`] - hard deadline and slow-handshake warning
//!
//! The relay client and the login handshake are external; see
//! [`SignerTransport`] and [`Authenticator`].

pub mod approval;
pub mod config;
pub mod error;
pub mod machine;
pub mod sequencer;
pub mod supervisor;

pub use approval::{ApprovalPoller, ProbeReport};
pub use config::{ApprovalPolicy, ConnectConfig, Environment, StageTimings};
pub use error::{ConfigError, Error, Result};
pub use machine::{ConnectionStateMachine, Snapshots};
pub use sequencer::{HandshakePlan, SequencerEvent, StageSequencer};
pub use signer_link_protocol::{
	ApprovalRequest, AuthProgress, ConnectUriBuilder, ErrorKind, PeerIdentity, ProgressSnapshot, RetryPath,
	SessionToken, Stage, TokenError, TokenScheme,
};
pub use signer_link_runtime::{AuthFailure, AuthRequest, Authenticator, ConnectError, ProgressReporter, SignerTransport};
pub use supervisor::{TimeoutSupervisor, Timer};
