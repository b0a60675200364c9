//! Hard deadline and soft "taking too long" warning for a session.
//!
//! Both timers are plain [`Sleep`]s owned by the driver loop and polled from
//! its `select!`. Clearing a timer drops it, so a cleared timer can never fire.

use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use tokio::time::{Sleep, sleep};

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
	Deadline { after: Duration },
	SlowWarning,
}

#[derive(Debug, Default)]
pub struct TimeoutSupervisor {
	deadline: Option<(Pin<Box<Sleep>>, Duration)>,
	slow: Option<Pin<Box<Sleep>>>,
}

impl TimeoutSupervisor {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the hard deadline.
	pub fn arm_deadline(&mut self, after: Duration) {
		self.deadline = Some((Box::pin(sleep(after)), after));
	}

	pub fn arm_slow_warning(&mut self, after: Duration) {
		self.slow = Some(Box::pin(sleep(after)));
	}

	pub fn clear_slow_warning(&mut self) {
		self.slow = None;
	}

	pub fn clear(&mut self) {
		self.deadline = None;
		self.slow = None;
	}

	#[cfg(test)]
	fn deadline(&self) -> Option<tokio::time::Instant> {
		self.deadline.as_ref().map(|(sleep, _)| sleep.deadline())
	}

	#[cfg(test)]
	fn is_idle(&self) -> bool {
		self.deadline.is_none() && self.slow.is_none()
	}

	/// Resolves when an armed timer fires, disarming it. Pending forever when
	/// nothing is armed. The deadline wins if both are due.
	pub async fn fired(&mut self) -> Timer {
		poll_fn(|cx| {
			if let Some((sleep, after)) = self.deadline.as_mut() {
				if sleep.as_mut().poll(cx).is_ready() {
					let after = *after;
					self.deadline = None;
					return Poll::Ready(Timer::Deadline { after });
				}
			}
			if let Some(sleep) = self.slow.as_mut() {
				if sleep.as_mut().poll(cx).is_ready() {
					self.slow = None;
					return Poll::Ready(Timer::SlowWarning);
				}
			}
			Poll::Pending
		})
		.await
	}
}
