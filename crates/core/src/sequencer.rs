//! Paced walk through the post-connection handshake stages.
//!
//! Once a peer is known the session moves `Connected → Signing → Syncing →
//! Complete`. Each step needs two things:
//!
//! 1. The stage has been visible for its minimum display time
//! 2. The authenticate call signalled readiness for the next stage
//!
//! Readiness flows through a `watch` channel written only by the task that
//! drives `authenticate`; the walk awaits it directly. When readiness arrives
//! early the step fires exactly when the minimum display time ends.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use signer_link_protocol::{AuthProgress, PeerIdentity, Stage};
use signer_link_runtime::{AuthRequest, Authenticator, ProgressReporter};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep_until};
use tracing::{debug, trace};

use crate::config::StageTimings;

/// Notifications delivered to the sequencer's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerEvent {
	/// The walk moved on to `stage`. `message` is the latest progress text
	/// from the authenticator, if any.
	Advanced { stage: Stage, message: Option<String> },
	/// Authentication succeeded and `Syncing` was shown long enough. Sent at
	/// most once.
	Completed,
	/// Authentication failed while `stage` was showing.
	Failed { stage: Stage, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
	Pending,
	Signing,
	Syncing,
	Done,
}

#[derive(Debug, Clone)]
struct Readiness {
	level: Level,
	message: Option<String>,
	failure: Option<String>,
}

impl Readiness {
	fn reached(&self, level: Level) -> bool {
		self.failure.is_some() || self.level >= level
	}
}

/// Level that must be reached before leaving `stage`.
fn exit_level(stage: Stage) -> Level {
	match stage {
		Stage::Connected => Level::Signing,
		Stage::Signing => Level::Syncing,
		_ => Level::Done,
	}
}

fn next_stage(stage: Stage) -> Option<Stage> {
	match stage {
		Stage::Connected => Some(Stage::Signing),
		Stage::Signing => Some(Stage::Syncing),
		_ => None,
	}
}

/// Handle to a running handshake. Dropping it aborts the walk and the
/// authenticate call.
#[derive(Debug)]
pub struct StageSequencer {
	task: JoinHandle<()>,
}

/// Inputs for [`StageSequencer::start`].
#[derive(Debug, Clone)]
pub struct HandshakePlan {
	pub peer: PeerIdentity,
	/// Stage already showing when the sequencer starts: `Connected`, or
	/// `Signing` on a resumed attempt.
	pub entry: Stage,
	pub timings: StageTimings,
	/// Passed through to the authenticator.
	pub auth_timeout: Duration,
}

impl StageSequencer {
	pub fn start<F>(authenticator: Arc<dyn Authenticator>, plan: HandshakePlan, on_event: F) -> Self
	where
		F: Fn(SequencerEvent) + Send + Sync + 'static,
	{
		let task = tokio::spawn(run(authenticator, plan, on_event));
		Self { task }
	}

	pub fn stop(&self) {
		self.task.abort();
	}

	pub fn is_running(&self) -> bool {
		!self.task.is_finished()
	}
}

impl Drop for StageSequencer {
	fn drop(&mut self) {
		self.task.abort();
	}
}

async fn run<F>(authenticator: Arc<dyn Authenticator>, plan: HandshakePlan, on_event: F)
where
	F: Fn(SequencerEvent),
{
	let (tx, rx) = watch::channel(Readiness {
		level: Level::Pending,
		message: None,
		failure: None,
	});
	let tx = Arc::new(tx);

	let reporter = {
		let tx = Arc::clone(&tx);
		ProgressReporter::new(move |progress, message| {
			// `Complete` from progress only opens `Signing`; the return value
			// is the sole completion signal.
			let level = match progress {
				AuthProgress::Signing => Level::Signing,
				AuthProgress::Syncing | AuthProgress::Complete => Level::Syncing,
			};
			trace!(?progress, message, "authenticate progress");
			tx.send_if_modified(|r| {
				let mut changed = false;
				if let Some(message) = message {
					r.message = Some(message.to_string());
					changed = true;
				}
				if level > r.level {
					r.level = level;
					changed = true;
				}
				changed
			});
		})
	};

	let authenticate = async {
		let request = AuthRequest {
			timeout: plan.auth_timeout,
			progress: reporter,
		};
		let result = authenticator.authenticate(&plan.peer, request).await;
		tx.send_modify(|r| match result {
			Ok(()) => r.level = Level::Done,
			Err(err) => r.failure = Some(err.message),
		});
	};

	tokio::join!(authenticate, walk(rx, &plan, &on_event));
}

async fn walk<F>(mut rx: watch::Receiver<Readiness>, plan: &HandshakePlan, on_event: &F)
where
	F: Fn(SequencerEvent),
{
	let mut stage = plan.entry;
	loop {
		let entered = Instant::now();
		let min_display = plan.timings.min_display(stage);
		let required = exit_level(stage);

		let failure = match rx.wait_for(|r| r.reached(required)).await {
			Ok(readiness) => readiness.failure.clone(),
			Err(_) => Some("authenticator stopped unexpectedly".to_string()),
		};
		if let Some(message) = failure {
			debug!(%stage, %message, "handshake failed");
			on_event(SequencerEvent::Failed { stage, message });
			return;
		}

		let show_until = entered + min_display;
		if Instant::now() < show_until {
			trace!(%stage, remaining_ms = (show_until - Instant::now()).as_millis() as u64, "holding stage");
			tokio::select! {
				_ = sleep_until(show_until) => {}
				Ok(readiness) = rx.wait_for(|r| r.failure.is_some()) => {
					let message = readiness.failure.clone().unwrap_or_default();
					drop(readiness);
					debug!(%stage, %message, "handshake failed");
					on_event(SequencerEvent::Failed { stage, message });
					return;
				}
			}
		}

		match next_stage(stage) {
			Some(next) => {
				let message = rx.borrow().message.clone();
				debug!(from = %stage, to = %next, "advancing handshake stage");
				on_event(SequencerEvent::Advanced { stage: next, message });
				stage = next;
			}
			None => {
				debug!(peer = %plan.peer.short(), "handshake complete");
				on_event(SequencerEvent::Completed);
				return;
			}
		}
	}
}
