//! Remote signer identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of a hex-encoded x-only public key.
pub const HEX_KEY_LEN: usize = 64;

/// Public key of the remote signer, known once a connect attempt succeeds.
///
/// Assigned at most once per session and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
	pub fn new(pubkey: impl Into<String>) -> Self {
		Self(pubkey.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Shortened form for logs and compact output (`abcd1234…9f0e`).
	pub fn short(&self) -> String {
		if self.0.len() <= 12 || !self.0.is_ascii() {
			return self.0.clone();
		}
		format!("{}…{}", &self.0[..8], &self.0[self.0.len() - 4..])
	}
}

impl fmt::Display for PeerIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Returns true if `value` is a 64-character hex public key.
pub fn is_hex_key(value: &str) -> bool {
	value.len() == HEX_KEY_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn short_form_keeps_prefix_and_suffix() {
		let peer = PeerIdentity::new("a".repeat(60) + "beef");
		assert_eq!(peer.short(), "aaaaaaaa…beef");
	}

	#[test]
	fn short_form_leaves_small_keys_alone() {
		assert_eq!(PeerIdentity::new("abc").short(), "abc");
	}

	#[test]
	fn hex_key_detection() {
		assert!(is_hex_key(&"0f".repeat(32)));
		assert!(!is_hex_key(&"0f".repeat(31)));
		assert!(!is_hex_key(&"zz".repeat(32)));
	}

	#[test]
	fn serializes_as_plain_string() {
		let json = serde_json::to_string(&PeerIdentity::new("abc")).unwrap();
		assert_eq!(json, r#""abc""#);
	}
}
