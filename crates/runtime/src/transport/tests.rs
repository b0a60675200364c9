use std::sync::Mutex;

use super::*;

#[test]
fn progress_reporter_forwards_every_report() {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	let reporter = ProgressReporter::new(move |progress, message| {
		sink.lock().unwrap().push((progress, message.map(str::to_string)));
	});

	reporter.report(AuthProgress::Signing, Some("signing login event"));
	reporter.clone().report(AuthProgress::Syncing, None);

	let seen = seen.lock().unwrap();
	assert_eq!(
		*seen,
		vec![
			(AuthProgress::Signing, Some("signing login event".to_string())),
			(AuthProgress::Syncing, None),
		]
	);
}

#[test]
fn noop_reporter_accepts_reports() {
	let reporter = ProgressReporter::noop();
	reporter.report(AuthProgress::Complete, Some("done"));
	assert!(format!("{reporter:?}").contains("ProgressReporter"));
}

#[test]
fn approval_required_is_not_a_refusal() {
	let approval = ConnectError::ApprovalRequired { approval_uri: None };
	assert!(approval.is_approval_required());
	assert!(!approval.is_terminal_refusal());

	assert!(ConnectError::Rejected("no".into()).is_terminal_refusal());
	assert!(ConnectError::Expired("used".into()).is_terminal_refusal());
	assert!(!ConnectError::Transport("relay down".into()).is_terminal_refusal());
}

#[test]
fn connect_error_messages() {
	assert_eq!(
		ConnectError::Rejected("user declined".into()).to_string(),
		"signer rejected the connection: user declined"
	);
	let wait: crate::WaitError = ConnectError::Transport("relay down".into()).into();
	assert_eq!(wait.to_string(), "transport error: relay down");
}
