//! Bounded re-probing while the signer waits for human approval.
//!
//! Approval flows are idempotent to probe, so every attempt reuses the same
//! token. The poller probes once per interval until the signer answers, sends
//! a final refusal, or the attempt budget is spent. [`ApprovalPoller::check_now`]
//! forces an extra probe that counts against the same budget.

use std::sync::Arc;

use signer_link_protocol::{PeerIdentity, SessionToken};
use signer_link_runtime::{ConnectError, TransportWaiter, WaitError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::debug;

use crate::config::ApprovalPolicy;

/// Outcome notifications delivered to the poller's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeReport {
	/// A probe finished. `attempt` counts from 1.
	Attempt {
		attempt: u32,
		result: Result<PeerIdentity, WaitError>,
	},
	/// The budget ran out without an answer. Sent once, after the last attempt.
	Exhausted { attempts: u32 },
}

/// Handle to a running poll loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct ApprovalPoller {
	check_tx: mpsc::UnboundedSender<()>,
	task: JoinHandle<()>,
}

impl ApprovalPoller {
	/// Starts polling. The first probe happens one interval from now.
	pub fn start<F>(waiter: Arc<TransportWaiter>, token: SessionToken, policy: ApprovalPolicy, on_result: F) -> Self
	where
		F: Fn(ProbeReport) + Send + 'static,
	{
		let (check_tx, check_rx) = mpsc::unbounded_channel();
		let task = tokio::spawn(poll_loop(waiter, token, policy, check_rx, on_result));
		Self { check_tx, task }
	}

	/// Requests an out-of-cycle probe. Returns false once the loop has ended.
	pub fn check_now(&self) -> bool {
		!self.task.is_finished() && self.check_tx.send(()).is_ok()
	}

	/// Stops the loop. Idempotent.
	pub fn stop(&self) {
		self.task.abort();
	}

	pub fn is_running(&self) -> bool {
		!self.task.is_finished()
	}
}

impl Drop for ApprovalPoller {
	fn drop(&mut self) {
		self.task.abort();
	}
}

async fn poll_loop<F>(
	waiter: Arc<TransportWaiter>,
	token: SessionToken,
	policy: ApprovalPolicy,
	mut check_rx: mpsc::UnboundedReceiver<()>,
	on_result: F,
) where
	F: Fn(ProbeReport),
{
	let period = policy.interval();
	let mut ticker = interval_at(Instant::now() + period, period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	let mut attempt = 0;

	loop {
		let manual = tokio::select! {
			biased;
			request = check_rx.recv() => match request {
				Some(()) => true,
				None => return,
			},
			_ = ticker.tick() => false,
		};

		attempt += 1;
		debug!(attempt, max = policy.max_attempts, manual, "probing signer for approval");

		let result = match timeout(policy.probe_timeout(), waiter.wait_for_peer(&token)).await {
			Ok(result) => result,
			Err(_) => Err(ConnectError::Transport("approval probe timed out".into()).into()),
		};
		let finished = match &result {
			Ok(_) | Err(WaitError::Released) => true,
			Err(WaitError::Connect(err)) => err.is_terminal_refusal(),
		};
		on_result(ProbeReport::Attempt { attempt, result });

		if finished {
			return;
		}
		if attempt >= policy.max_attempts {
			debug!(attempts = attempt, "approval polling exhausted");
			on_result(ProbeReport::Exhausted { attempts: attempt });
			return;
		}

		// Requests queued during the probe were answered by it.
		while check_rx.try_recv().is_ok() {}
		if manual {
			ticker.reset();
		}
	}
}
