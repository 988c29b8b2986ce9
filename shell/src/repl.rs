use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use nix::sys::signal::{self, SigHandler, Signal};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, info};

use crate::eval::Executor;
use crate::global::State;
use crate::session::{Flow, Session};

pub const PROMPT: &str = "nsh> ";

/// Keeps the shell itself alive on terminal interrupts; children restore
/// the default dispositions before exec.
pub fn ignore_terminal_signals() -> nix::Result<()> {
	unsafe {
		signal::signal(Signal::SIGINT, SigHandler::SigIgn)?;
		signal::signal(Signal::SIGTTOU, SigHandler::SigIgn)?;
	}
	Ok(())
}

/// Runs a local session and returns the process exit code.
pub fn run(state: &State, script: Option<&Path>) -> Result<i32> {
	ignore_terminal_signals().context("cannot set signal dispositions")?;
	let executor = Executor::new(Arc::clone(&state.jobs));
	match script {
		Some(path) => {
			let file = File::open(path).with_context(|| format!("cannot open script `{}`", path.display()))?;
			info!(script = %path.display(), "running script");
			run_lines(Session::new(executor), BufReader::new(file))
		},
		None if io::stdin().is_terminal() => interactive(Session::new(executor.terminal(true))),
		None => run_lines(Session::new(executor), io::stdin().lock()),
	}
}

/// Feeds every line of `input` to `session`.
pub fn run_lines<R: BufRead>(mut session: Session, input: R) -> Result<i32> {
	let stdout = io::stdout();
	let stderr = io::stderr();
	for line in input.lines() {
		let line = line.context("cannot read input")?;
		let flow = session.run_line(&line, &mut stdout.lock(), &mut stderr.lock())?;
		if flow != Flow::Continue {
			debug!(?flow, "session ended");
			break;
		}
	}
	Ok(session.last_exit_code().unwrap_or(1))
}

fn interactive(mut session: Session) -> Result<i32> {
	let mut editor = DefaultEditor::new().context("cannot initialize line editor")?;
	let stdout = io::stdout();
	let stderr = io::stderr();
	loop {
		match editor.readline(PROMPT) {
			Ok(line) => {
				if !line.trim().is_empty() {
					let _ = editor.add_history_entry(line.as_str());
				}
				let flow = session.run_line(&line, &mut stdout.lock(), &mut stderr.lock())?;
				if flow != Flow::Continue {
					break;
				}
			},
			Err(ReadlineError::Interrupted) => continue,
			Err(ReadlineError::Eof) => {
				println!("exit");
				break;
			},
			Err(e) => return Err(e).context("cannot read line"),
		}
	}
	Ok(session.last_exit_code().unwrap_or(1))
}
