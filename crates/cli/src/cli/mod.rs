
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use signer_link::Environment;

use crate::output::OutputFormat;
use crate::styles::cli_styles;

/// Root CLI for signer-link.
#[derive(Parser, Debug)]
#[command(name = "signer-link")]
#[command(about = "Remote-signer connection strings and session simulation")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: text (default), json, or ndjson
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Build a nostrconnect:// connection string for a signer to scan.
	Uri(UriArgs),
	/// Validate a pasted bunker:// connection string.
	Check(CheckArgs),
	/// Run a connection attempt against a scripted signer.
	Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct UriArgs {
	/// Client public key (64 hex characters).
	#[arg(long, value_name = "HEX")]
	pub client_key: String,

	/// Relay the signer should answer on (repeatable).
	#[arg(long = "relay", value_name = "URL", required = true)]
	pub relays: Vec<String>,

	/// Fixed secret instead of a generated one.
	#[arg(long, value_name = "SECRET")]
	pub secret: Option<String>,

	/// Application name shown by the signer.
	#[arg(long, value_name = "NAME")]
	pub name: Option<String>,

	/// Requested permissions, comma separated (e.g. sign_event:22242).
	#[arg(long, value_name = "PERMS", value_delimiter = ',')]
	pub perms: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
	/// The connection string to validate.
	#[arg(value_name = "STRING")]
	pub connection_string: String,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
	/// Built-in signer behaviour to run against.
	#[arg(long, value_enum, default_value = "instant", conflicts_with = "script")]
	pub scenario: Scenario,

	/// JSON signer script instead of a built-in scenario.
	#[arg(long, value_name = "FILE")]
	pub script: Option<PathBuf>,

	/// JSON connect configuration.
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Override the environment from the configuration.
	#[arg(long, value_enum)]
	pub environment: Option<EnvironmentArg>,

	/// Paste this bunker:// string instead of using a direct-connect token.
	#[arg(long, value_name = "STRING")]
	pub connection_string: Option<String>,

	/// Cancel the session after this many milliseconds.
	#[arg(long, value_name = "MS")]
	pub cancel_after_ms: Option<u64>,
}

/// Built-in signer scripts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
	/// Signer answers at once and authentication succeeds.
	Instant,
	/// Signer asks for human approval twice before connecting.
	Approval,
	/// Signer declines the connection.
	Rejected,
	/// Authentication stalls in signing, then succeeds.
	SlowAuth,
	/// The pasted secret was already used.
	Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EnvironmentArg {
	Desktop,
	Mobile,
}

impl From<EnvironmentArg> for Environment {
	fn from(arg: EnvironmentArg) -> Self {
		match arg {
			EnvironmentArg::Desktop => Environment::Desktop,
			EnvironmentArg::Mobile => Environment::Mobile,
		}
	}
}
