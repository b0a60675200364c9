//! Connection strings and the session tokens wrapping them.
//!
//! Two bootstrap channels exist:
//!
//! 1. **Direct connect**: the client generates a `nostrconnect://` string and
//!    shows it as a link or QR code; the signer scans it and answers.
//! 2. **Bunker URL**: the signer issues a `bunker://` string which the user
//!    pastes into the client.
//!
//! Both are treated as opaque tokens tagged with their scheme. Parsing here is
//! limited to rejecting strings that cannot possibly be connection strings.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::identity::is_hex_key;

/// URI scheme of signer-issued connection strings.
pub const BUNKER_SCHEME: &str = "bunker";

/// URI scheme of client-issued connection strings.
pub const DIRECT_CONNECT_SCHEME: &str = "nostrconnect";

/// Reasons a connection string is rejected before any transport call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
	#[error("connection string is empty")]
	Empty,

	#[error("connection string is not a valid URI: {0}")]
	Malformed(String),

	#[error("expected a {expected}:// connection string, got {found}://")]
	UnsupportedScheme { expected: &'static str, found: String },

	#[error("connection string does not carry a valid hex public key")]
	InvalidKey,

	#[error("connection string does not name any relay")]
	MissingRelay,
}

/// Bootstrap channel a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScheme {
	/// Generated locally and shown to the user.
	DirectConnect,
	/// Supplied by the user, issued by the signer.
	BunkerUrl,
}

impl TokenScheme {
	pub fn uri_scheme(self) -> &'static str {
		match self {
			TokenScheme::DirectConnect => DIRECT_CONNECT_SCHEME,
			TokenScheme::BunkerUrl => BUNKER_SCHEME,
		}
	}
}

impl fmt::Display for TokenScheme {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TokenScheme::DirectConnect => write!(f, "direct_connect"),
			TokenScheme::BunkerUrl => write!(f, "bunker_url"),
		}
	}
}

/// Identifies one connection attempt. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
	raw: String,
	scheme: TokenScheme,
	/// Unix timestamp (ms) at creation; carried in the serialized form only.
	issued_at_ms: u64,
}

impl SessionToken {
	/// Wraps a client-generated `nostrconnect://` string.
	///
	/// The string comes from [`ConnectUriBuilder`] or an external builder and
	/// is not re-validated.
	pub fn direct_connect(raw: impl Into<String>) -> Self {
		Self {
			raw: raw.into(),
			scheme: TokenScheme::DirectConnect,
			issued_at_ms: now_ms(),
		}
	}

	/// Validates a pasted `bunker://` string and wraps it.
	///
	/// Surrounding whitespace is trimmed before validation.
	pub fn parse_bunker(raw: &str) -> Result<Self, TokenError> {
		let trimmed = raw.trim();
		ConnectionDetails::parse(trimmed, TokenScheme::BunkerUrl)?;
		Ok(Self {
			raw: trimmed.to_string(),
			scheme: TokenScheme::BunkerUrl,
			issued_at_ms: now_ms(),
		})
	}

	pub fn raw(&self) -> &str {
		&self.raw
	}

	pub fn scheme(&self) -> TokenScheme {
		self.scheme
	}

	/// Parsed key, relays and secret, if the raw string is well formed.
	pub fn details(&self) -> Result<ConnectionDetails, TokenError> {
		ConnectionDetails::parse(&self.raw, self.scheme)
	}

	/// Embedded single-use secret, if any.
	pub fn secret(&self) -> Option<String> {
		self.details().ok().and_then(|d| d.secret)
	}

	/// Deep-link string for a platform "open external app" primitive.
	///
	/// Only direct-connect tokens are meant to be handed to another app.
	pub fn connection_uri(&self) -> Option<&str> {
		match self.scheme {
			TokenScheme::DirectConnect => Some(&self.raw),
			TokenScheme::BunkerUrl => None,
		}
	}
}

/// Components of a well-formed connection string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
	/// Signer key for bunker strings, client key for direct-connect strings.
	pub key: String,
	pub relays: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub secret: Option<String>,
}

impl ConnectionDetails {
	pub fn parse(raw: &str, scheme: TokenScheme) -> Result<Self, TokenError> {
		if raw.is_empty() {
			return Err(TokenError::Empty);
		}

		let url = Url::parse(raw).map_err(|e| TokenError::Malformed(e.to_string()))?;
		if url.scheme() != scheme.uri_scheme() {
			return Err(TokenError::UnsupportedScheme {
				expected: scheme.uri_scheme(),
				found: url.scheme().to_string(),
			});
		}

		let key = url.host_str().unwrap_or_default();
		if !is_hex_key(key) {
			return Err(TokenError::InvalidKey);
		}

		let mut relays = Vec::new();
		let mut secret = None;
		for (name, value) in url.query_pairs() {
			match name.as_ref() {
				"relay" if !value.is_empty() => relays.push(value.into_owned()),
				"secret" if !value.is_empty() => secret = Some(value.into_owned()),
				_ => {}
			}
		}
		if relays.is_empty() {
			return Err(TokenError::MissingRelay);
		}

		Ok(Self {
			key: key.to_ascii_lowercase(),
			relays,
			secret,
		})
	}
}

/// Builds client-issued `nostrconnect://` connection strings.
#[derive(Debug, Clone, Default)]
pub struct ConnectUriBuilder {
	client_pubkey: String,
	relays: Vec<String>,
	secret: Option<String>,
	name: Option<String>,
	app_url: Option<String>,
	perms: Vec<String>,
}

impl ConnectUriBuilder {
	pub fn new(client_pubkey: impl Into<String>) -> Self {
		Self {
			client_pubkey: client_pubkey.into(),
			..Default::default()
		}
	}

	pub fn relay(mut self, relay: impl Into<String>) -> Self {
		self.relays.push(relay.into());
		self
	}

	pub fn relays<I, S>(mut self, relays: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.relays.extend(relays.into_iter().map(Into::into));
		self
	}

	/// Fixes the secret instead of generating one.
	pub fn secret(mut self, secret: impl Into<String>) -> Self {
		self.secret = Some(secret.into());
		self
	}

	/// Application name shown by the signer.
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Application URL shown by the signer.
	pub fn app_url(mut self, url: impl Into<String>) -> Self {
		self.app_url = Some(url.into());
		self
	}

	/// Requested permissions, e.g. `sign_event:22242`.
	pub fn perm(mut self, perm: impl Into<String>) -> Self {
		self.perms.push(perm.into());
		self
	}

	pub fn build(self) -> Result<SessionToken, TokenError> {
		if !is_hex_key(&self.client_pubkey) {
			return Err(TokenError::InvalidKey);
		}
		if self.relays.iter().all(|r| r.trim().is_empty()) {
			return Err(TokenError::MissingRelay);
		}

		let mut url = Url::parse(&format!(
			"{DIRECT_CONNECT_SCHEME}://{}",
			self.client_pubkey.to_ascii_lowercase()
		))
		.map_err(|e| TokenError::Malformed(e.to_string()))?;

		{
			let mut query = url.query_pairs_mut();
			for relay in self.relays.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
				query.append_pair("relay", relay);
			}
			let secret = self.secret.unwrap_or_else(generate_secret);
			query.append_pair("secret", &secret);
			if !self.perms.is_empty() {
				query.append_pair("perms", &self.perms.join(","));
			}
			if let Some(ref name) = self.name {
				query.append_pair("name", name);
			}
			if let Some(ref app_url) = self.app_url {
				query.append_pair("url", app_url);
			}
		}

		Ok(SessionToken::direct_connect(url.to_string()))
	}
}

/// Generates a per-attempt secret for direct-connect strings.
///
/// Not a cryptographic key: it only lets the client match the signer's reply
/// to the string it displayed.
pub fn generate_secret() -> String {
	static COUNTER: AtomicU64 = AtomicU64::new(0);
	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_nanos() as u64;
	let n = COUNTER.fetch_add(1, Ordering::Relaxed);
	format!("{:016x}", nanos ^ 0xDEAD_BEEF_CAFE_BABE ^ n.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key() -> String {
		"ab".repeat(32)
	}

	#[test]
	fn bunker_string_is_trimmed_and_accepted() {
		let raw = format!("  bunker://{}?relay=wss%3A%2F%2Frelay.example.com&secret=s3cr3t \n", key());
		let token = SessionToken::parse_bunker(&raw).unwrap();
		assert_eq!(token.scheme(), TokenScheme::BunkerUrl);
		assert_eq!(token.raw(), raw.trim());
		assert_eq!(token.secret().as_deref(), Some("s3cr3t"));
		assert!(token.connection_uri().is_none());
	}

	#[test]
	fn whitespace_only_is_empty() {
		assert_eq!(SessionToken::parse_bunker("   \t"), Err(TokenError::Empty));
	}

	#[test]
	fn bare_word_is_malformed() {
		assert!(matches!(SessionToken::parse_bunker("bad"), Err(TokenError::Malformed(_))));
	}

	#[test]
	fn serialized_token_carries_its_issue_time() {
		let token = SessionToken::direct_connect("nostrconnect://abc");
		let json = serde_json::to_value(&token).unwrap();
		assert_eq!(json["scheme"], "direct_connect");
		assert!(json["issuedAtMs"].as_u64().is_some_and(|ms| ms > 0));
	}

	#[test]
	fn direct_connect_string_is_not_a_bunker() {
		let raw = format!("nostrconnect://{}?relay=wss://r.example", key());
		assert_eq!(
			SessionToken::parse_bunker(&raw),
			Err(TokenError::UnsupportedScheme {
				expected: "bunker",
				found: "nostrconnect".into()
			})
		);
	}

	#[test]
	fn bunker_requires_hex_key_and_relay() {
		assert_eq!(
			SessionToken::parse_bunker("bunker://npub1xyz?relay=wss://r.example"),
			Err(TokenError::InvalidKey)
		);
		assert_eq!(
			SessionToken::parse_bunker(&format!("bunker://{}?secret=x", key())),
			Err(TokenError::MissingRelay)
		);
	}

	#[test]
	fn details_collect_every_relay() {
		let raw = format!("bunker://{}?relay=wss://a.example&relay=wss://b.example", key());
		let details = SessionToken::parse_bunker(&raw).unwrap().details().unwrap();
		assert_eq!(details.key, key());
		assert_eq!(details.relays, vec!["wss://a.example", "wss://b.example"]);
		assert_eq!(details.secret, None);
	}

	#[test]
	fn builder_produces_parseable_direct_connect_uri() {
		let token = ConnectUriBuilder::new(key())
			.relay("wss://relay.example.com")
			.secret("fixed")
			.name("Example App")
			.perm("sign_event:22242")
			.perm("nip44_encrypt")
			.build()
			.unwrap();

		assert_eq!(token.scheme(), TokenScheme::DirectConnect);
		assert!(token.raw().starts_with("nostrconnect://"));
		assert_eq!(token.connection_uri(), Some(token.raw()));

		let details = token.details().unwrap();
		assert_eq!(details.relays, vec!["wss://relay.example.com"]);
		assert_eq!(details.secret.as_deref(), Some("fixed"));
		assert!(token.raw().contains("perms=sign_event%3A22242%2Cnip44_encrypt"));
	}

	#[test]
	fn builder_generates_distinct_secrets() {
		let a = ConnectUriBuilder::new(key()).relay("wss://r.example").build().unwrap();
		let b = ConnectUriBuilder::new(key()).relay("wss://r.example").build().unwrap();
		assert!(a.secret().is_some());
		assert_ne!(a.secret(), b.secret());
	}

	#[test]
	fn builder_rejects_missing_relay() {
		assert_eq!(ConnectUriBuilder::new(key()).build(), Err(TokenError::MissingRelay));
		assert_eq!(
			ConnectUriBuilder::new("nothex").relay("wss://r.example").build(),
			Err(TokenError::InvalidKey)
		);
	}
}
