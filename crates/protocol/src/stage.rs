//! Session stages and authentication progress tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered progress tag of a session.
///
/// Internal events only move a session forward along
/// `Idle → Waiting → Connected → Signing → Syncing → Complete`.
/// [`Stage::AwaitingApproval`] branches off `Waiting` and rejoins at
/// `Connected`. `Error`, `Idle` and `Cancelled` are reached through explicit
/// retry or cancel commands, or through failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	#[default]
	Idle,
	Waiting,
	AwaitingApproval,
	Connected,
	Signing,
	Syncing,
	Complete,
	Error,
	/// Terminal state after a user cancel.
	Cancelled,
}

impl Stage {
	/// Position along the forward path, `None` for off-path stages.
	pub fn rank(self) -> Option<u8> {
		match self {
			Stage::Idle => Some(0),
			Stage::Waiting => Some(1),
			Stage::AwaitingApproval => Some(2),
			Stage::Connected => Some(3),
			Stage::Signing => Some(4),
			Stage::Syncing => Some(5),
			Stage::Complete => Some(6),
			Stage::Error | Stage::Cancelled => None,
		}
	}

	/// Whether an internal event may move a session from `self` to `next`.
	///
	/// Failures may always enter [`Stage::Error`]. Everything else must move
	/// strictly forward along the ranked path.
	pub fn can_advance_to(self, next: Stage) -> bool {
		if self.is_terminal() {
			return false;
		}
		if next == Stage::Error {
			return self != Stage::Error;
		}
		match (self.rank(), next.rank()) {
			(Some(from), Some(to)) => to > from,
			_ => false,
		}
	}

	/// `Complete` and `Cancelled` end a session; a new token is required.
	pub fn is_terminal(self) -> bool {
		matches!(self, Stage::Complete | Stage::Cancelled)
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Stage::Idle => "idle",
			Stage::Waiting => "waiting",
			Stage::AwaitingApproval => "awaiting_approval",
			Stage::Connected => "connected",
			Stage::Signing => "signing",
			Stage::Syncing => "syncing",
			Stage::Complete => "complete",
			Stage::Error => "error",
			Stage::Cancelled => "cancelled",
		};
		f.write_str(name)
	}
}

/// Progress reported by the external authenticate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProgress {
	Signing,
	Syncing,
	Complete,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn forward_path_only_moves_forward() {
		assert!(Stage::Idle.can_advance_to(Stage::Waiting));
		assert!(Stage::Waiting.can_advance_to(Stage::Connected));
		assert!(Stage::Signing.can_advance_to(Stage::Syncing));
		assert!(!Stage::Syncing.can_advance_to(Stage::Connected));
		assert!(!Stage::Signing.can_advance_to(Stage::Signing));
	}

	#[test]
	fn approval_rejoins_at_connected() {
		assert!(Stage::Waiting.can_advance_to(Stage::AwaitingApproval));
		assert!(Stage::AwaitingApproval.can_advance_to(Stage::Connected));
		assert!(!Stage::AwaitingApproval.can_advance_to(Stage::Waiting));
	}

	#[test]
	fn terminal_stages_never_advance() {
		for next in [Stage::Idle, Stage::Waiting, Stage::Error, Stage::Complete] {
			assert!(!Stage::Complete.can_advance_to(next));
			assert!(!Stage::Cancelled.can_advance_to(next));
		}
	}

	#[test]
	fn any_live_stage_may_fail() {
		for from in [Stage::Waiting, Stage::AwaitingApproval, Stage::Connected, Stage::Signing, Stage::Syncing] {
			assert!(from.can_advance_to(Stage::Error));
		}
		assert!(!Stage::Error.can_advance_to(Stage::Error));
	}

	#[test]
	fn progress_tags_are_ordered() {
		assert!(AuthProgress::Signing < AuthProgress::Syncing);
		assert!(AuthProgress::Syncing < AuthProgress::Complete);
	}

	#[test]
	fn stage_serializes_snake_case() {
		let json = serde_json::to_string(&Stage::AwaitingApproval).unwrap();
		assert_eq!(json, r#""awaiting_approval""#);
	}
}
