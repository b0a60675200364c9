//! Timing and environment settings for a connection attempt.
//!
//! All durations are stored in milliseconds so the JSON form stays flat:
//!
//! ```json
//! {
//!   "environment": "mobile",
//!   "transportTimeoutMs": 10000,
//!   "approval": { "intervalMs": 4000, "maxAttempts": 30 },
//!   "stages": { "connectedMs": 800, "signingMs": 1500, "syncingMs": 1200 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use signer_link_protocol::Stage;

use crate::error::ConfigError;

/// Where the connect flow is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
	/// A second device can scan the QR code, so waiting starts immediately.
	#[default]
	Desktop,
	/// Waiting starts only after an explicit user action.
	Mobile,
}

/// Settings for one [`ConnectionStateMachine`](crate::ConnectionStateMachine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectConfig {
	pub environment: Environment,
	/// Hard deadline while waiting on a pasted bunker string.
	pub transport_timeout_ms: u64,
	/// Hard deadline while waiting on a direct-connect string. Longer than
	/// `transport_timeout_ms` since the user still has to scan or open it.
	pub direct_connect_timeout_ms: u64,
	/// Hard deadline for the authentication handshake.
	pub auth_timeout_ms: u64,
	/// Delay after entering a handshake stage before flagging it as slow.
	pub slow_warning_ms: u64,
	pub approval: ApprovalPolicy,
	pub stages: StageTimings,
}

impl Default for ConnectConfig {
	fn default() -> Self {
		Self {
			environment: Environment::Desktop,
			transport_timeout_ms: 10_000,
			direct_connect_timeout_ms: 120_000,
			auth_timeout_ms: 30_000,
			slow_warning_ms: 15_000,
			approval: ApprovalPolicy::default(),
			stages: StageTimings::default(),
		}
	}
}

impl ConnectConfig {
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		let config: Self = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	/// Loads and validates a JSON config file.
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_json(&content)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		let positive = [
			("transportTimeoutMs", self.transport_timeout_ms),
			("directConnectTimeoutMs", self.direct_connect_timeout_ms),
			("authTimeoutMs", self.auth_timeout_ms),
			("slowWarningMs", self.slow_warning_ms),
			("approval.intervalMs", self.approval.interval_ms),
			("approval.maxAttempts", u64::from(self.approval.max_attempts)),
			("approval.probeTimeoutMs", self.approval.probe_timeout_ms),
		];
		for (field, value) in positive {
			if value == 0 {
				return Err(ConfigError::Zero { field });
			}
		}
		Ok(())
	}

	pub fn with_environment(mut self, environment: Environment) -> Self {
		self.environment = environment;
		self
	}

	pub fn transport_timeout(&self) -> Duration {
		Duration::from_millis(self.transport_timeout_ms)
	}

	pub fn direct_connect_timeout(&self) -> Duration {
		Duration::from_millis(self.direct_connect_timeout_ms)
	}

	pub fn auth_timeout(&self) -> Duration {
		Duration::from_millis(self.auth_timeout_ms)
	}

	pub fn slow_warning(&self) -> Duration {
		Duration::from_millis(self.slow_warning_ms)
	}
}

/// Polling schedule used while the signer waits for human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalPolicy {
	pub interval_ms: u64,
	pub max_attempts: u32,
	/// A probe still unanswered after this long counts as a failed attempt.
	pub probe_timeout_ms: u64,
}

impl Default for ApprovalPolicy {
	fn default() -> Self {
		Self {
			interval_ms: 4_000,
			max_attempts: 30,
			probe_timeout_ms: 10_000,
		}
	}
}

impl ApprovalPolicy {
	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}

	pub fn probe_timeout(&self) -> Duration {
		Duration::from_millis(self.probe_timeout_ms)
	}
}

/// Minimum time each handshake stage stays visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageTimings {
	pub connected_ms: u64,
	pub signing_ms: u64,
	pub syncing_ms: u64,
}

impl Default for StageTimings {
	fn default() -> Self {
		Self {
			connected_ms: 800,
			signing_ms: 1_500,
			syncing_ms: 1_200,
		}
	}
}

impl StageTimings {
	/// Minimum display time for a handshake stage, zero for any other stage.
	pub fn min_display(&self, stage: Stage) -> Duration {
		let ms = match stage {
			Stage::Connected => self.connected_ms,
			Stage::Signing => self.signing_ms,
			Stage::Syncing => self.syncing_ms,
			_ => 0,
		};
		Duration::from_millis(ms)
	}
}
