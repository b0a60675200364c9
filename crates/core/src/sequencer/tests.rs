use std::sync::Mutex;

use signer_link_runtime::{AuthOutcome, AuthScript, ScriptedSigner, SignerScript};

use super::*;

type Log = Arc<Mutex<Vec<(u64, SequencerEvent)>>>;

fn timings() -> StageTimings {
	StageTimings {
		connected_ms: 800,
		signing_ms: 1_500,
		syncing_ms: 1_200,
	}
}

fn start(script: AuthScript, entry: Stage) -> (StageSequencer, Log, Arc<ScriptedSigner>) {
	let signer = Arc::new(ScriptedSigner::new(SignerScript::new().auth_script(script)));
	let log: Log = Arc::default();
	let sink = Arc::clone(&log);
	let started = Instant::now();
	let plan = HandshakePlan {
		peer: signer.peer(),
		entry,
		timings: timings(),
		auth_timeout: Duration::from_secs(30),
	};
	let sequencer = StageSequencer::start(signer.clone(), plan, move |event| {
		let at = (Instant::now() - started).as_millis() as u64;
		sink.lock().unwrap().push((at, event));
	});
	(sequencer, log, signer)
}

fn advanced(stage: Stage) -> SequencerEvent {
	SequencerEvent::Advanced { stage, message: None }
}

fn events(log: &Log) -> Vec<(u64, SequencerEvent)> {
	log.lock().unwrap().clone()
}

#[tokio::test(start_paused = true)]
async fn instant_authenticate_still_honours_minimums() {
	let (_sequencer, log, signer) = start(AuthScript::instant(), Stage::Connected);

	tokio::time::sleep(Duration::from_secs(10)).await;

	assert_eq!(
		events(&log),
		vec![
			(800, advanced(Stage::Signing)),
			(2_300, advanced(Stage::Syncing)),
			(3_500, SequencerEvent::Completed),
		]
	);
	assert_eq!(signer.stats().auth_calls, 1);
	assert_eq!(signer.last_auth_timeout(), Some(Duration::from_secs(30)));
}

#[tokio::test(start_paused = true)]
async fn late_readiness_gates_the_transition() {
	let script = AuthScript::instant()
		.step(2_000, AuthProgress::Signing)
		.step(100, AuthProgress::Syncing)
		.finish_after(5_000);
	let (_sequencer, log, _signer) = start(script, Stage::Connected);

	tokio::time::sleep(Duration::from_secs(20)).await;

	assert_eq!(
		events(&log),
		vec![
			(2_000, advanced(Stage::Signing)),
			(3_500, advanced(Stage::Syncing)),
			(7_100, SequencerEvent::Completed),
		]
	);
}

#[tokio::test(start_paused = true)]
async fn complete_progress_is_not_completion() {
	let script = AuthScript::instant().step(0, AuthProgress::Complete).finish_after(10_000);
	let (_sequencer, log, _signer) = start(script, Stage::Connected);

	tokio::time::sleep(Duration::from_secs(9)).await;
	assert_eq!(events(&log).len(), 2);

	tokio::time::sleep(Duration::from_secs(5)).await;
	assert_eq!(events(&log).last(), Some(&(10_000, SequencerEvent::Completed)));
}

#[tokio::test(start_paused = true)]
async fn progress_message_rides_along_with_the_next_stage() {
	let mut script = AuthScript::instant().step(100, AuthProgress::Signing);
	script.steps[0].message = Some("signing login event".into());
	let (_sequencer, log, _signer) = start(script, Stage::Connected);

	tokio::time::sleep(Duration::from_secs(1)).await;

	assert_eq!(
		events(&log)[0],
		(
			800,
			SequencerEvent::Advanced {
				stage: Stage::Signing,
				message: Some("signing login event".into())
			}
		)
	);
}

#[tokio::test(start_paused = true)]
async fn failure_before_signing_is_tagged_connected() {
	let script = AuthScript::instant().outcome(AuthOutcome::Failure {
		message: "bad signature".into(),
	});
	let (_sequencer, log, _signer) = start(script, Stage::Connected);

	tokio::time::sleep(Duration::from_secs(5)).await;

	assert_eq!(
		events(&log),
		vec![(
			0,
			SequencerEvent::Failed {
				stage: Stage::Connected,
				message: "bad signature".into()
			}
		)]
	);
}

#[tokio::test(start_paused = true)]
async fn failure_during_signing_interrupts_the_hold() {
	let script = AuthScript::instant()
		.step(100, AuthProgress::Signing)
		.step(100, AuthProgress::Syncing)
		.finish_after(900)
		.outcome(AuthOutcome::Failure {
			message: "session rejected".into(),
		});
	let (_sequencer, log, _signer) = start(script, Stage::Connected);

	tokio::time::sleep(Duration::from_secs(5)).await;

	assert_eq!(
		events(&log),
		vec![
			(800, advanced(Stage::Signing)),
			(
				1_100,
				SequencerEvent::Failed {
					stage: Stage::Signing,
					message: "session rejected".into()
				}
			),
		]
	);
}

#[tokio::test(start_paused = true)]
async fn resumed_walk_starts_at_signing() {
	let (_sequencer, log, _signer) = start(AuthScript::instant(), Stage::Signing);

	tokio::time::sleep(Duration::from_secs(5)).await;

	assert_eq!(
		events(&log),
		vec![(1_500, advanced(Stage::Syncing)), (2_700, SequencerEvent::Completed)]
	);
}

#[tokio::test(start_paused = true)]
async fn stopped_sequencer_reports_nothing() {
	let (sequencer, log, _signer) = start(AuthScript::instant(), Stage::Connected);

	tokio::time::sleep(Duration::from_millis(900)).await;
	sequencer.stop();
	tokio::time::sleep(Duration::from_secs(10)).await;

	assert_eq!(events(&log), vec![(800, advanced(Stage::Signing))]);
	assert!(!sequencer.is_running());
}
