mod check;
mod simulate;
mod uri;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::output::OutputFormat;

pub use simulate::{SessionRun, run_session};

pub async fn dispatch(cli: Cli, format: OutputFormat) -> Result<()> {
	match cli.command {
		Commands::Uri(args) => uri::execute(args, format),
		Commands::Check(args) => check::execute(args, format),
		Commands::Simulate(args) => simulate::execute(args, format).await,
	}
}

/// Command name used in result envelopes.
pub fn name(command: &Commands) -> &'static str {
	match command {
		Commands::Uri(_) => "uri",
		Commands::Check(_) => "check",
		Commands::Simulate(_) => "simulate",
	}
}
