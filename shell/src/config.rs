use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_PORT: u16 = 8088;
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_CLIENT_HOST: &str = "127.0.0.1";

pub const ABOUT: &str = concat!(
	"nsh ", env!("CARGO_PKG_VERSION"), "\n",
	"A small shell that runs pipelines, redirections and background jobs,\n",
	"locally or for several clients over TCP.\n",
);

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "nsh", version, about = "A small non-POSIX shell")]
pub struct Args {
	/// Script to run instead of reading commands from stdin
	pub script: Option<PathBuf>,

	/// Serve sessions over TCP
	#[arg(short = 's', long = "server", conflicts_with_all = ["client", "script"])]
	pub server: bool,

	/// Relay the terminal to a running server
	#[arg(short = 'c', long = "client", conflicts_with = "script")]
	pub client: bool,

	/// Port to listen on or connect to
	#[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
	pub port: u16,

	/// Address to listen on or connect to
	#[arg(short = 'i', long = "host")]
	pub host: Option<String>,

	/// Close server sessions idle for this many seconds
	#[arg(short = 't', long = "timeout", value_name = "SECONDS")]
	pub timeout: Option<u64>,

	/// Log process lifecycle events
	#[arg(short = 'v', long = "verbose")]
	pub verbose: bool,

	/// Write logs to this file instead of stderr
	#[arg(short = 'l', long = "log-file", value_name = "FILE")]
	pub log_file: Option<PathBuf>,

	/// Print information about nsh and exit
	#[arg(short = 'a', long = "about")]
	pub about: bool,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ServerConfig {
	pub host: String,
	pub port: u16,
	pub idle_timeout: Option<Duration>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ClientConfig {
	pub host: String,
	pub port: u16,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Mode {
	Local { script: Option<PathBuf> },
	Server(ServerConfig),
	Client(ClientConfig),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Config {
	pub mode: Mode,
	pub verbose: bool,
	pub log_file: Option<PathBuf>,
}

impl From<Args> for Config {
	fn from(args: Args) -> Config {
		let mode = if args.server {
			Mode::Server(ServerConfig {
				host: args.host.unwrap_or_else(|| DEFAULT_SERVER_HOST.to_owned()),
				port: args.port,
				// zero disables the timeout
				idle_timeout: args.timeout.filter(|&secs| secs > 0).map(Duration::from_secs),
			})
		} else if args.client {
			Mode::Client(ClientConfig {
				host: args.host.unwrap_or_else(|| DEFAULT_CLIENT_HOST.to_owned()),
				port: args.port,
			})
		} else {
			Mode::Local { script: args.script }
		};
		Config { mode: mode, verbose: args.verbose, log_file: args.log_file }
	}
}
