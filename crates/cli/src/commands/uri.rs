//! Build a direct-connect string.

use signer_link::ConnectUriBuilder;
use tracing::info;

use crate::cli::UriArgs;
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, UriData, print_result};

pub fn execute(args: UriArgs, format: OutputFormat) -> Result<()> {
	let mut builder = ConnectUriBuilder::new(args.client_key).relays(args.relays);
	if let Some(secret) = args.secret {
		builder = builder.secret(secret);
	}
	if let Some(name) = args.name {
		builder = builder.name(name);
	}
	for perm in args.perms {
		builder = builder.perm(perm);
	}

	let token = builder.build()?;
	let details = token.details()?;
	info!(target = "signer_link_cli", relays = details.relays.len(), "built connection string");

	let result = ResultBuilder::new("uri")
		.data(UriData {
			uri: token.raw().to_string(),
			relays: details.relays,
			secret: details.secret,
		})
		.build();

	if format == OutputFormat::Text {
		println!("{}", token.raw());
	} else {
		print_result(&result, format);
	}
	Ok(())
}
