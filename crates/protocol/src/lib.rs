//! Data types for remote-signer session establishment.
//!
//! This crate contains the plain, serde-serializable values exchanged between
//! the connection state machine and whoever renders its progress:
//!
//! - [`SessionToken`] - the connection string identifying one attempt
//! - [`PeerIdentity`] - the remote signer's public key once it answered
//! - [`Stage`] - the ordered progress tag of a session
//! - [`ProgressSnapshot`] - the single value published after every transition
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No I/O, no timers, no async
//! - **Opaque where it matters**: connection strings are validated for shape
//!   only, their protocol semantics belong to the transport
//! - **Stable**: Snapshot fields only grow

pub mod identity;
pub mod snapshot;
pub mod stage;
pub mod token;

pub use identity::*;
pub use snapshot::*;
pub use stage::*;
pub use token::*;
