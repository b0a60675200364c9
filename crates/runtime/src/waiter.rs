//! Waits for the remote signer to answer a connection token.
//!
//! The waiter owns the session's single transport subscription:
//!
//! 1. [`TransportWaiter::wait_for_peer`] releases any previous subscription
//!    before opening a new one
//! 2. A release guard closes the subscription if the wait future is dropped
//!    (task abort, `select!` losing branch)
//! 3. [`TransportWaiter::release`] force-closes it from outside; a connect
//!    call that finishes afterwards reports [`WaitError::Released`] and its
//!    result is discarded
//!
//! On success the subscription stays open for the handshake until released.


use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use signer_link_protocol::{PeerIdentity, SessionToken};
use tracing::debug;

use crate::error::{Result, WaitError};
use crate::transport::SignerTransport;

#[derive(Debug, Clone)]
struct Subscription {
	id: u64,
	token: SessionToken,
	released: Arc<AtomicBool>,
}

impl Subscription {
	/// Closes the subscription once. Returns false if it was already closed.
	fn release(&self, transport: &dyn SignerTransport) -> bool {
		if self.released.swap(true, Ordering::SeqCst) {
			return false;
		}
		transport.release(&self.token);
		true
	}

	fn is_released(&self) -> bool {
		self.released.load(Ordering::SeqCst)
	}
}

/// RAII guard releasing the subscription when a wait is abandoned.
struct ReleaseGuard {
	subscription: Subscription,
	transport: Arc<dyn SignerTransport>,
	completed: bool,
}

impl ReleaseGuard {
	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for ReleaseGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.subscription.release(self.transport.as_ref()) {
			debug!(id = self.subscription.id, "ReleaseGuard: released abandoned subscription");
		}
	}
}

/// Exclusive owner of the transport subscription for one state machine.
pub struct TransportWaiter {
	transport: Arc<dyn SignerTransport>,
	active: Mutex<Option<Subscription>>,
	next_id: AtomicU64,
}

impl TransportWaiter {
	pub fn new(transport: Arc<dyn SignerTransport>) -> Self {
		Self {
			transport,
			active: Mutex::new(None),
			next_id: AtomicU64::new(0),
		}
	}

	/// Performs one connect attempt for `token`.
	///
	/// Any subscription held from an earlier call is released first, so at
	/// most one is ever live.
	pub async fn wait_for_peer(&self, token: &SessionToken) -> Result<PeerIdentity> {
		let subscription = self.open(token);
		let mut guard = ReleaseGuard {
			subscription: subscription.clone(),
			transport: Arc::clone(&self.transport),
			completed: false,
		};

		debug!(id = subscription.id, scheme = %token.scheme(), "waiting for signer");
		let outcome = self.transport.connect(token).await;

		if subscription.is_released() {
			guard.complete();
			debug!(id = subscription.id, "discarding result of released subscription");
			return Err(WaitError::Released);
		}

		match outcome {
			Ok(peer) => {
				guard.complete();
				debug!(id = subscription.id, peer = %peer.short(), "signer answered");
				Ok(peer)
			}
			Err(err) => {
				drop(guard);
				self.forget(subscription.id);
				debug!(id = subscription.id, error = %err, "connect attempt failed");
				Err(err.into())
			}
		}
	}

	/// Force-releases the current subscription. Idempotent.
	///
	/// Returns true if a live subscription was closed.
	pub fn release(&self) -> bool {
		let Some(subscription) = self.active.lock().take() else {
			return false;
		};
		let released = subscription.release(self.transport.as_ref());
		if released {
			debug!(id = subscription.id, "subscription force-released");
		}
		released
	}

	/// Whether the subscription from the last successful wait can still carry
	/// a handshake: this waiter has not released it and the transport reports
	/// it open.
	pub fn is_alive(&self) -> bool {
		let held = self.active.lock().as_ref().is_some_and(|s| !s.is_released());
		held && self.transport.is_alive()
	}

	#[cfg(test)]
	fn holds_subscription(&self) -> bool {
		self.active.lock().as_ref().is_some_and(|s| !s.is_released())
	}

	fn open(&self, token: &SessionToken) -> Subscription {
		let subscription = Subscription {
			id: self.next_id.fetch_add(1, Ordering::SeqCst),
			token: token.clone(),
			released: Arc::new(AtomicBool::new(false)),
		};
		let previous = self.active.lock().replace(subscription.clone());
		if let Some(previous) = previous {
			if previous.release(self.transport.as_ref()) {
				debug!(id = previous.id, "released previous subscription before opening a new one");
			}
		}
		subscription
	}

	fn forget(&self, id: u64) {
		let mut active = self.active.lock();
		if active.as_ref().is_some_and(|s| s.id == id) {
			*active = None;
		}
	}
}
