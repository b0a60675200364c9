//! Driver task: the single owner of session state.
//!
//! Commands, background reports and timers are handled one at a time from a
//! biased `select!`. Background work (peer wait, approval poller, stage
//! sequencer) runs in spawned tasks that report through [`EventSink`], tagged
//! with the session epoch. Every teardown bumps the epoch, so reports from
//! disposed work are dropped before they can touch state.

use std::collections::HashSet;
use std::sync::Arc;

use signer_link_protocol::{
	ApprovalRequest, ErrorKind, PeerIdentity, ProgressSnapshot, RetryPath, SessionToken, Stage, TokenScheme,
};
use signer_link_runtime::{Authenticator, ConnectError, SignerTransport, TransportWaiter, WaitError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::Command;
use crate::approval::{ApprovalPoller, ProbeReport};
use crate::config::{ConnectConfig, Environment};
use crate::sequencer::{HandshakePlan, SequencerEvent, StageSequencer};
use crate::supervisor::{TimeoutSupervisor, Timer};

#[derive(Debug)]
enum Event {
	Peer(Result<PeerIdentity, WaitError>),
	ManualProbe(Result<PeerIdentity, WaitError>),
	Probe(ProbeReport),
	Sequencer(SequencerEvent),
}

#[derive(Debug)]
struct Tagged {
	epoch: u64,
	event: Event,
}

/// Epoch-stamped sender handed to background tasks.
#[derive(Clone)]
struct EventSink {
	tx: mpsc::UnboundedSender<Tagged>,
	epoch: u64,
}

impl EventSink {
	fn send(&self, event: Event) {
		let _ = self.tx.send(Tagged {
			epoch: self.epoch,
			event,
		});
	}
}

struct Session {
	token: SessionToken,
	peer: Option<PeerIdentity>,
	/// Initial peer wait or a manual approval probe.
	wait: Option<JoinHandle<()>>,
	poller: Option<ApprovalPoller>,
	sequencer: Option<StageSequencer>,
	completed: bool,
}

impl Session {
	fn new(token: SessionToken) -> Self {
		Self {
			token,
			peer: None,
			wait: None,
			poller: None,
			sequencer: None,
			completed: false,
		}
	}

	fn stop_tasks(&mut self) {
		if let Some(wait) = self.wait.take() {
			wait.abort();
		}
		self.poller = None;
		self.sequencer = None;
	}

	fn probe_in_flight(&self) -> bool {
		self.wait.as_ref().is_some_and(|w| !w.is_finished())
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.stop_tasks();
	}
}

pub(super) struct Driver {
	config: ConnectConfig,
	waiter: Arc<TransportWaiter>,
	authenticator: Arc<dyn Authenticator>,
	snapshots: mpsc::UnboundedSender<ProgressSnapshot>,
	events_tx: mpsc::UnboundedSender<Tagged>,
	events_rx: Option<mpsc::UnboundedReceiver<Tagged>>,
	epoch: u64,
	session: Option<Session>,
	supervisor: TimeoutSupervisor,
	/// Bunker strings the signer refused or reported as used.
	spent: HashSet<String>,
	view: ProgressSnapshot,
}

impl Driver {
	pub(super) fn new(
		config: ConnectConfig,
		transport: Arc<dyn SignerTransport>,
		authenticator: Arc<dyn Authenticator>,
		snapshots: mpsc::UnboundedSender<ProgressSnapshot>,
	) -> Self {
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		Self {
			config,
			waiter: Arc::new(TransportWaiter::new(transport)),
			authenticator,
			snapshots,
			events_tx,
			events_rx: Some(events_rx),
			epoch: 0,
			session: None,
			supervisor: TimeoutSupervisor::new(),
			spent: HashSet::new(),
			view: ProgressSnapshot::default(),
		}
	}

	pub(super) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
		let Some(mut events) = self.events_rx.take() else {
			return;
		};

		loop {
			tokio::select! {
				biased;
				command = commands.recv() => match command {
					Some(command) => self.handle_command(command),
					None => break,
				},
				Some(tagged) = events.recv() => self.handle_event(tagged),
				timer = self.supervisor.fired() => self.handle_timer(timer),
			}
		}

		debug!("state machine handle dropped");
		self.teardown();
	}

	fn handle_command(&mut self, command: Command) {
		trace!(?command, stage = %self.view.stage, "command");
		match command {
			Command::Start(token) => self.start(token),
			Command::Engage => self.engage(),
			Command::Submit(raw) => self.submit(&raw),
			Command::CheckApproval => self.check_approval(),
			Command::Retry => self.retry(),
			Command::Cancel => self.cancel(),
		}
	}

	fn handle_event(&mut self, Tagged { epoch, event }: Tagged) {
		if epoch != self.epoch {
			trace!(epoch, current = self.epoch, "dropping event from disposed work");
			return;
		}
		match event {
			Event::Peer(result) => {
				if let Some(session) = self.session.as_mut() {
					session.wait = None;
				}
				match result {
					Ok(peer) => self.on_connected(peer),
					Err(WaitError::Released) => debug!("peer wait released"),
					Err(WaitError::Connect(err)) => self.on_connect_error(err),
				}
			}
			Event::ManualProbe(result) => {
				if let Some(session) = self.session.as_mut() {
					session.wait = None;
				}
				self.on_probe_result(result);
			}
			Event::Probe(ProbeReport::Attempt { attempt, result }) => {
				if let Some(approval) = self.view.approval.as_mut() {
					approval.poll_attempt = attempt;
				}
				self.on_probe_result(result);
			}
			Event::Probe(ProbeReport::Exhausted { attempts }) => self.on_poll_exhausted(attempts),
			Event::Sequencer(event) => self.on_sequencer(event),
		}
	}

	fn handle_timer(&mut self, timer: Timer) {
		match timer {
			Timer::Deadline { after } => {
				let stage = self.view.stage;
				self.fail(ErrorKind::TimeoutError, format!("{stage} did not finish within {after:?}"));
			}
			Timer::SlowWarning => {
				warn!(stage = %self.view.stage, "handshake is taking longer than expected");
				self.view.slow_warning = true;
				self.emit();
			}
		}
	}

	// Commands

	fn start(&mut self, token: SessionToken) {
		self.teardown();
		if token.scheme() == TokenScheme::BunkerUrl {
			self.open_bunker(token);
			return;
		}

		info!(scheme = %token.scheme(), environment = ?self.config.environment, "starting session");
		self.view = fresh_view(&token);
		self.session = Some(Session::new(token));
		match self.config.environment {
			Environment::Desktop => self.begin_wait(),
			Environment::Mobile => self.emit(),
		}
	}

	fn engage(&mut self) {
		let pending = self.view.stage == Stage::Idle
			&& self
				.session
				.as_ref()
				.is_some_and(|s| s.peer.is_none() && s.wait.is_none());
		if !pending {
			debug!(stage = %self.view.stage, "engage ignored: no pending session");
			return;
		}
		self.begin_wait();
	}

	fn submit(&mut self, raw: &str) {
		self.teardown();
		match SessionToken::parse_bunker(raw) {
			Ok(token) => self.open_bunker(token),
			Err(err) => {
				debug!(error = %err, "rejecting pasted connection string");
				self.view = ProgressSnapshot {
					scheme: Some(TokenScheme::BunkerUrl),
					..ProgressSnapshot::default()
				};
				self.fail(ErrorKind::InvalidInput, err.to_string());
			}
		}
	}

	fn check_approval(&mut self) {
		if self.view.stage != Stage::AwaitingApproval {
			debug!(stage = %self.view.stage, "approval check ignored");
			return;
		}
		let sink = self.sink();
		let waiter = Arc::clone(&self.waiter);
		let probe_timeout = self.config.approval.probe_timeout();
		let Some(session) = self.session.as_mut() else {
			return;
		};

		if let Some(poller) = session.poller.as_ref() {
			if poller.check_now() {
				return;
			}
		}
		if session.probe_in_flight() {
			return;
		}

		debug!("manual approval probe");
		let token = session.token.clone();
		session.wait = Some(tokio::spawn(async move {
			let result = match timeout(probe_timeout, waiter.wait_for_peer(&token)).await {
				Ok(result) => result,
				Err(_) => Err(ConnectError::Transport("approval probe timed out".into()).into()),
			};
			sink.send(Event::ManualProbe(result));
		}));
	}

	fn retry(&mut self) {
		let stage = self.view.stage;
		if stage.is_terminal() || stage == Stage::Idle {
			debug!(%stage, "nothing to retry");
			return;
		}

		let peer = self.resumable_peer();
		match peer {
			Some(peer) => {
				info!(peer = %peer.short(), "resuming handshake at signing");
				self.halt();
				self.view.error_kind = None;
				self.view.failed_stage = None;
				self.view.message = None;
				self.view.retry = None;
				self.view.slow_warning = false;
				self.enter(Stage::Signing);
				self.supervisor.arm_deadline(self.config.auth_timeout());
				self.emit();
				self.start_handshake(peer, Stage::Signing);
			}
			None => {
				info!("discarding session; a fresh connection string is needed");
				self.teardown();
				self.view = ProgressSnapshot {
					retry: Some(RetryPath::FreshToken),
					message: Some("start again with a fresh connection string".into()),
					..ProgressSnapshot::default()
				};
				self.emit();
			}
		}
	}

	fn cancel(&mut self) {
		if matches!(self.view.stage, Stage::Cancelled | Stage::Complete) {
			debug!(stage = %self.view.stage, "cancel ignored");
			return;
		}
		info!(stage = %self.view.stage, "session cancelled");
		self.teardown();
		self.view = ProgressSnapshot {
			stage: Stage::Cancelled,
			scheme: self.view.scheme,
			message: Some("cancelled".into()),
			..ProgressSnapshot::default()
		};
		self.emit();
	}

	// Transport

	fn open_bunker(&mut self, token: SessionToken) {
		self.view = fresh_view(&token);
		if self.spent.contains(token.raw()) {
			self.fail(
				ErrorKind::ExpiredToken,
				"this connection string was already used; get a new one from your signer".into(),
			);
			return;
		}
		info!(scheme = %token.scheme(), "starting session");
		self.session = Some(Session::new(token));
		self.begin_wait();
	}

	fn begin_wait(&mut self) {
		let sink = self.sink();
		let waiter = Arc::clone(&self.waiter);
		let Some(session) = self.session.as_mut() else {
			return;
		};
		let token = session.token.clone();
		let deadline = match token.scheme() {
			TokenScheme::BunkerUrl => self.config.transport_timeout(),
			TokenScheme::DirectConnect => self.config.direct_connect_timeout(),
		};

		session.wait = Some(tokio::spawn(async move {
			let result = waiter.wait_for_peer(&token).await;
			sink.send(Event::Peer(result));
		}));
		self.supervisor.arm_deadline(deadline);
		if self.advance(Stage::Waiting) {
			self.emit();
		}
	}

	fn on_connect_error(&mut self, err: ConnectError) {
		let message = err.to_string();
		match err {
			ConnectError::ApprovalRequired { approval_uri } => self.enter_approval(approval_uri),
			ConnectError::Rejected(_) => {
				self.mark_spent();
				self.fail(ErrorKind::RejectedError, message);
			}
			ConnectError::Expired(_) => {
				self.mark_spent();
				self.fail(ErrorKind::ExpiredToken, message);
			}
			ConnectError::Transport(_) => self.fail(ErrorKind::TransportError, message),
		}
	}

	fn mark_spent(&mut self) {
		if let Some(session) = self.session.as_ref() {
			if session.token.scheme() == TokenScheme::BunkerUrl {
				self.spent.insert(session.token.raw().to_string());
			}
		}
	}

	// Approval

	fn enter_approval(&mut self, approval_uri: Option<String>) {
		if !self.advance(Stage::AwaitingApproval) {
			return;
		}
		self.supervisor.clear();

		let policy = self.config.approval;
		let sink = self.sink();
		let waiter = Arc::clone(&self.waiter);
		let Some(session) = self.session.as_mut() else {
			return;
		};
		info!(approval_uri = approval_uri.as_deref(), "signer requires approval");

		self.view.approval = Some(ApprovalRequest {
			approval_uri,
			poll_attempt: 0,
			max_poll_attempts: policy.max_attempts,
			poll_interval_ms: policy.interval_ms,
		});
		self.view.message = Some("approve the connection on your signer".into());
		session.poller = Some(ApprovalPoller::start(waiter, session.token.clone(), policy, move |report| {
			sink.send(Event::Probe(report));
		}));
		self.emit();
	}

	fn on_probe_result(&mut self, result: Result<PeerIdentity, WaitError>) {
		match result {
			Ok(peer) => self.on_connected(peer),
			Err(WaitError::Released) => debug!("approval probe released"),
			Err(WaitError::Connect(ConnectError::ApprovalRequired { approval_uri })) => {
				if let Some(approval) = self.view.approval.as_mut() {
					if approval_uri.is_some() {
						approval.approval_uri = approval_uri;
					}
					self.view.message = Some(format!(
						"still waiting for approval ({} of {} checks)",
						approval.poll_attempt, approval.max_poll_attempts
					));
				}
				self.emit();
			}
			Err(WaitError::Connect(ConnectError::Transport(message))) => {
				debug!(%message, "approval probe failed; polling continues");
				self.view.message = Some(format!("could not reach the signer ({message}); still waiting"));
				self.emit();
			}
			Err(WaitError::Connect(err)) => self.on_connect_error(err),
		}
	}

	fn on_poll_exhausted(&mut self, attempts: u32) {
		if let Some(session) = self.session.as_mut() {
			session.poller = None;
		}
		warn!(attempts, "no approval before polling ran out");
		self.view.message = Some(format!(
			"no approval after {attempts} checks; approve on your signer and check again, or cancel"
		));
		self.emit();
	}

	// Handshake

	fn on_connected(&mut self, peer: PeerIdentity) {
		if !self.advance(Stage::Connected) {
			return;
		}
		self.supervisor.clear();
		if let Some(session) = self.session.as_mut() {
			session.peer = Some(peer.clone());
			session.poller = None;
		}
		info!(peer = %peer.short(), "signer connected");

		self.view.peer = Some(peer.clone());
		self.view.approval = None;
		self.view.message = None;
		self.supervisor.arm_deadline(self.config.auth_timeout());
		self.emit();
		self.start_handshake(peer, Stage::Connected);
	}

	fn start_handshake(&mut self, peer: PeerIdentity, entry: Stage) {
		let sink = self.sink();
		let plan = HandshakePlan {
			peer,
			entry,
			timings: self.config.stages,
			auth_timeout: self.config.auth_timeout(),
		};
		let sequencer = StageSequencer::start(Arc::clone(&self.authenticator), plan, move |event| {
			sink.send(Event::Sequencer(event));
		});
		if let Some(session) = self.session.as_mut() {
			session.sequencer = Some(sequencer);
		}
	}

	fn on_sequencer(&mut self, event: SequencerEvent) {
		match event {
			SequencerEvent::Advanced { stage, message } => {
				if self.advance(stage) {
					if message.is_some() {
						self.view.message = message;
					}
					self.emit();
				}
			}
			SequencerEvent::Completed => {
				let Some(session) = self.session.as_mut() else {
					return;
				};
				if session.completed {
					return;
				}
				session.completed = true;
				if !self.advance(Stage::Complete) {
					return;
				}
				info!("session established");
				self.supervisor.clear();
				self.view.message = None;
				self.emit();
				self.teardown();
			}
			SequencerEvent::Failed { stage, message } => {
				self.fail_at(ErrorKind::AuthenticateFailure, message, stage);
			}
		}
	}

	// State

	fn advance(&mut self, next: Stage) -> bool {
		let current = self.view.stage;
		if !current.can_advance_to(next) {
			warn!(from = %current, to = %next, "ignoring out-of-order transition");
			return false;
		}
		self.enter(next);
		true
	}

	/// Moves to `stage`, resetting the slow warning on any change.
	fn enter(&mut self, stage: Stage) {
		if stage != self.view.stage {
			self.supervisor.clear_slow_warning();
			self.view.slow_warning = false;
		}
		debug!(from = %self.view.stage, to = %stage, epoch = self.epoch, "stage");
		self.view.stage = stage;
		if matches!(stage, Stage::Signing | Stage::Syncing) {
			self.supervisor.arm_slow_warning(self.config.slow_warning());
		}
	}

	fn fail(&mut self, kind: ErrorKind, message: String) {
		let stage = self.view.stage;
		self.fail_at(kind, message, stage);
	}

	fn fail_at(&mut self, kind: ErrorKind, message: String, stage: Stage) {
		self.halt();
		let retry = if self.resumable_peer().is_some() {
			RetryPath::ResumeSigning
		} else {
			self.waiter.release();
			RetryPath::FreshToken
		};
		warn!(%kind, failed_stage = %stage, %message, ?retry, "session failed");

		self.enter(Stage::Error);
		self.view.error_kind = Some(kind);
		self.view.failed_stage = Some(stage);
		self.view.message = Some(message);
		self.view.approval = None;
		self.view.retry = Some(retry);
		self.emit();
	}

	/// Peer of the current session if its subscription can still carry a
	/// handshake.
	fn resumable_peer(&self) -> Option<PeerIdentity> {
		let peer = self.session.as_ref()?.peer.clone()?;
		self.waiter.is_alive().then_some(peer)
	}

	fn sink(&self) -> EventSink {
		EventSink {
			tx: self.events_tx.clone(),
			epoch: self.epoch,
		}
	}

	/// Stops background work and timers; keeps the session and subscription.
	fn halt(&mut self) {
		self.epoch += 1;
		self.supervisor.clear();
		if let Some(session) = self.session.as_mut() {
			session.stop_tasks();
		}
	}

	/// Disposes the session and releases its subscription.
	fn teardown(&mut self) {
		self.halt();
		self.waiter.release();
		self.session = None;
	}

	fn emit(&self) {
		trace!(stage = %self.view.stage, "publishing snapshot");
		if self.snapshots.send(self.view.clone()).is_err() {
			trace!("snapshot receiver dropped");
		}
	}
}

impl Drop for Driver {
	fn drop(&mut self) {
		self.teardown();
	}
}

fn fresh_view(token: &SessionToken) -> ProgressSnapshot {
	ProgressSnapshot {
		scheme: Some(token.scheme()),
		connection_uri: token.connection_uri().map(str::to_string),
		..ProgressSnapshot::default()
	}
}
