use signer_link::{ConfigError, TokenError};
use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	/// The command already printed its envelope; only the exit code remains.
	#[error("")]
	OutputAlreadyPrinted,

	#[error("invalid connection string: {0}")]
	Token(#[from] TokenError),

	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Signer script could not be read or parsed; carries the context chain.
	#[error("{0:#}")]
	Script(anyhow::Error),

	#[error(transparent)]
	Session(#[from] signer_link::Error),
}

impl CliError {
	pub fn is_output_already_printed(&self) -> bool {
		matches!(self, CliError::OutputAlreadyPrinted)
	}

	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let (code, message, details) = match self {
			CliError::OutputAlreadyPrinted => (ErrorCode::InternalError, String::new(), None),
			CliError::Token(err) => (ErrorCode::InvalidInput, self.to_string(), Some(serde_json::json!({ "reason": err.to_string() }))),
			CliError::Config(err) => (ErrorCode::ConfigError, err.to_string(), None),
			CliError::Script(err) => (ErrorCode::ConfigError, format!("{err:#}"), None),
			CliError::Session(err) => (ErrorCode::InternalError, err.to_string(), None),
		};

		CommandError { code, message, details }
	}
}
