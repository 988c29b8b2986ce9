use std::fs::File;
use std::process;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use nix::sys::signal::Signal;
use tracing::error;
use tracing_subscriber::EnvFilter;

use nsh::config::{self, Args, Config, Mode};
use nsh::global::State;
use nsh::server::Server;
use nsh::{client, reaper, repl};

const LOG_ENV: &str = "NSH_LOG";

fn init_logging(config: &Config) -> Result<()> {
	let default = match (config.verbose, &config.mode) {
		(true, _) => "debug",
		(false, Mode::Local { .. }) => "warn",
		(false, _) => "info",
	};
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
	let builder = tracing_subscriber::fmt().with_env_filter(filter);
	match config.log_file {
		Some(ref path) => {
			let file = File::create(path).with_context(|| format!("cannot create log file `{}`", path.display()))?;
			builder.with_ansi(false).with_writer(Mutex::new(file)).init();
		},
		None => builder.with_writer(std::io::stderr).init(),
	}
	Ok(())
}

fn run(config: Config) -> Result<i32> {
	let state = State::new();
	match config.mode {
		Mode::Local { ref script } => {
			let signals = reaper::block(&[Signal::SIGCHLD]).context("cannot block SIGCHLD")?;
			reaper::spawn(Arc::clone(&state.jobs), signals, None).context("cannot start the reaper")?;
			repl::run(&state, script.as_ref().map(|p| p.as_path()))
		},
		Mode::Server(ref server_config) => {
			let signals = reaper::block(&[Signal::SIGCHLD, Signal::SIGINT]).context("cannot block signals")?;
			reaper::spawn(Arc::clone(&state.jobs), signals, Some(Arc::clone(&state.running)))
				.context("cannot start the reaper")?;
			Server::bind(server_config, state)?.serve()?;
			Ok(0)
		},
		Mode::Client(ref client_config) => {
			client::run(client_config)?;
			Ok(0)
		},
	}
}

fn main() {
	let args = Args::parse();
	if args.about {
		print!("{}", config::ABOUT);
		return;
	}
	let config = Config::from(args);
	if let Err(e) = init_logging(&config) {
		eprintln!("nsh: {:#}", e);
		process::exit(1);
	}
	match run(config) {
		Ok(code) => process::exit(code),
		Err(e) => {
			error!(error = %format!("{:#}", e), "fatal");
			eprintln!("nsh: {:#}", e);
			process::exit(1);
		},
	}
}

