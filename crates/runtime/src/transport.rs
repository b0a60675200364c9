//! Seams to the external relay client and authentication function.
//!
//! Neither the remote-signer wire format nor its cryptography lives in this
//! workspace. The state machine only needs:
//!
//! - [`SignerTransport`]: open a subscription for a token and wait for the
//!   signer's answer, release it on demand, report whether it is still usable
//! - [`Authenticator`]: run the post-connection handshake for a known peer,
//!   reporting progress through a [`ProgressReporter`]

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use signer_link_protocol::{AuthProgress, PeerIdentity, SessionToken};

use crate::error::{AuthFailure, ConnectError};

/// Relay client used to reach the remote signer.
///
/// # Subscription contract
///
/// Every call to [`connect`](Self::connect) opens one subscription for the
/// token. It stays open, whatever the outcome, until
/// [`release`](Self::release) is called for that token. Callers never hold
/// more than one.
#[async_trait]
pub trait SignerTransport: Send + Sync {
	/// Opens a subscription for `token` and resolves once the signer answers.
	///
	/// Must not retry internally: one call is one attempt.
	async fn connect(&self, token: &SessionToken) -> Result<PeerIdentity, ConnectError>;

	/// Closes the subscription opened for `token`. Must be synchronous so it
	/// can run from `Drop`.
	fn release(&self, token: &SessionToken);

	/// Whether the subscription opened by the most recent successful
	/// [`connect`](Self::connect) is still open and able to carry signing
	/// requests.
	fn is_alive(&self) -> bool;
}

/// External authentication handshake run once a peer is known.
#[async_trait]
pub trait Authenticator: Send + Sync {
	/// Runs the handshake against `peer`.
	///
	/// Progress reports feed the visible stages; the return value is the only
	/// success signal for completion.
	async fn authenticate(&self, peer: &PeerIdentity, request: AuthRequest) -> Result<(), AuthFailure>;
}

/// Per-call options handed to [`Authenticator::authenticate`].
#[derive(Clone)]
pub struct AuthRequest {
	/// Budget the caller will enforce. Informational for the authenticator.
	pub timeout: Duration,
	pub progress: ProgressReporter,
}

type ProgressFn = dyn Fn(AuthProgress, Option<&str>) + Send + Sync;

/// Callback through which an authenticator reports handshake progress.
#[derive(Clone)]
pub struct ProgressReporter {
	inner: Arc<ProgressFn>,
}

impl ProgressReporter {
	pub fn new<F>(f: F) -> Self
	where
		F: Fn(AuthProgress, Option<&str>) + Send + Sync + 'static,
	{
		Self { inner: Arc::new(f) }
	}

	/// A reporter that drops every report.
	pub fn noop() -> Self {
		Self::new(|_, _| {})
	}

	pub fn report(&self, progress: AuthProgress, message: Option<&str>) {
		(self.inner)(progress, message);
	}
}

impl fmt::Debug for ProgressReporter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProgressReporter").finish_non_exhaustive()
	}
}
