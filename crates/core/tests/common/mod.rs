#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use signer_link::{ConnectConfig, ConnectUriBuilder, ConnectionStateMachine, ProgressSnapshot, SessionToken, Stage};
use signer_link_runtime::{Authenticator, ScriptedSigner, SignerScript};
use tokio::time::Instant;

pub const CLIENT_KEY: &str = "0f2c53bf0d8e4a4c11d2e6a9a0f7b3c8e1d4f6a2b9c0d3e5f7a8b1c2d4e6f8a0";

/// Snapshot log entry: milliseconds since the harness started.
pub type Entry = (u64, ProgressSnapshot);

pub struct Harness {
	pub machine: ConnectionStateMachine,
	pub signer: Arc<ScriptedSigner>,
	log: Arc<Mutex<Vec<Entry>>>,
}

impl Harness {
	pub fn new(config: ConnectConfig, script: SignerScript) -> Self {
		let signer = Arc::new(ScriptedSigner::new(script));
		Self::with_authenticator(config, Arc::clone(&signer), signer)
	}

	pub fn with_authenticator(
		config: ConnectConfig,
		signer: Arc<ScriptedSigner>,
		authenticator: Arc<dyn Authenticator>,
	) -> Self {
		let (machine, mut snapshots) = ConnectionStateMachine::spawn(config, signer.clone(), authenticator).unwrap();
		let log: Arc<Mutex<Vec<Entry>>> = Arc::default();
		let sink = Arc::clone(&log);
		let started = Instant::now();
		tokio::spawn(async move {
			while let Some(snapshot) = snapshots.recv().await {
				let at = (Instant::now() - started).as_millis() as u64;
				sink.lock().push((at, snapshot));
			}
		});
		Self { machine, signer, log }
	}

	pub fn log(&self) -> Vec<Entry> {
		self.log.lock().clone()
	}

	pub fn len(&self) -> usize {
		self.log.lock().len()
	}

	pub fn last(&self) -> ProgressSnapshot {
		self.log.lock().last().map(|(_, s)| s.clone()).unwrap_or_default()
	}

	/// Distinct stages in publication order.
	pub fn stages(&self) -> Vec<Stage> {
		let mut stages: Vec<Stage> = Vec::new();
		for (_, snapshot) in self.log.lock().iter() {
			if stages.last() != Some(&snapshot.stage) {
				stages.push(snapshot.stage);
			}
		}
		stages
	}

	/// Time of the first snapshot in `stage`.
	pub fn entered(&self, stage: Stage) -> Option<u64> {
		self.log.lock().iter().find(|(_, s)| s.stage == stage).map(|(at, _)| *at)
	}

	pub fn snapshots_in(&self, stage: Stage) -> Vec<ProgressSnapshot> {
		self.log
			.lock()
			.iter()
			.filter(|(_, s)| s.stage == stage)
			.map(|(_, s)| s.clone())
			.collect()
	}
}

pub async fn advance(ms: u64) {
	tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub fn direct_token() -> SessionToken {
	ConnectUriBuilder::new(CLIENT_KEY)
		.relay("wss://relay.example")
		.secret("a1b2c3")
		.name("signer-link tests")
		.build()
		.unwrap()
}

pub fn bunker_string(secret: &str) -> String {
	format!(
		"bunker://{}?relay=wss%3A%2F%2Frelay.example&secret={secret}",
		"7e".repeat(32)
	)
}

pub fn config() -> ConnectConfig {
	ConnectConfig::default()
}
