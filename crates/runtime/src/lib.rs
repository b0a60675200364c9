//! Collaborator seams for signer-link sessions.
//!
//! - [`SignerTransport`] / [`Authenticator`]: what the state machine needs
//!   from the relay client and the login handshake
//! - [`TransportWaiter`]: owns the single transport subscription of a
//!   session, with forced release and late-result discard
//! - [`ScriptedSigner`]: in-memory implementation of both seams, driven by a
//!   [`SignerScript`]

pub mod error;
pub mod scripted;
pub mod transport;
pub mod waiter;

pub use error::{AuthFailure, ConnectError, Result, WaitError};
pub use scripted::{AuthOutcome, AuthScript, AuthStep, ConnectOutcome, ConnectStep, ScriptedSigner, SignerScript, SignerStats};
pub use transport::{AuthRequest, Authenticator, ProgressReporter, SignerTransport};
pub use waiter::TransportWaiter;
