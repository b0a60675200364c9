//! Validate a pasted signer-issued connection string.

use signer_link::SessionToken;
use tracing::info;

use crate::cli::CheckArgs;
use crate::error::Result;
use crate::output::{CheckData, OutputFormat, ResultBuilder, print_result};

pub fn execute(args: CheckArgs, format: OutputFormat) -> Result<()> {
	let token = SessionToken::parse_bunker(&args.connection_string)?;
	let details = token.details()?;
	info!(target = "signer_link_cli", signer = %details.key, "connection string is well formed");

	let result = ResultBuilder::new("check")
		.data(CheckData {
			scheme: token.scheme(),
			signer: details.key,
			relays: details.relays,
			has_secret: details.secret.is_some(),
		})
		.build();
	print_result(&result, format);
	Ok(())
}
