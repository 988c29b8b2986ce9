use std::io::Write;

use tracing::debug;

use crate::builtin::{self, Verb};
use crate::eval::{ExecStatus, Executor, FatalError};
use crate::job::Mode;
use crate::parser::Parser;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Flow {
	Continue,
	/// End this session.
	Quit,
	/// End this session and stop accepting new ones.
	Halt,
}

/// One logical session: an executor fed one input line at a time.
pub struct Session {
	executor: Executor,
	last_exit_code: Option<i32>,
}

impl Session {
	pub fn new(executor: Executor) -> Session {
		Session { executor: executor, last_exit_code: Some(0) }
	}

	/// Exit code of the last foreground unit, `None` if it did not exit normally.
	pub fn last_exit_code(&self) -> Option<i32> {
		self.last_exit_code
	}

	/// Runs every command on `line`.
	///
	/// Listings and help text go to `out`, one diagnostic line per failed
	/// unit goes to `err`.
	pub fn run_line(&mut self, line: &str, out: &mut dyn Write, err: &mut dyn Write) -> Result<Flow, FatalError> {
		let mut parser = Parser::new(line);
		loop {
			let result = self.executor.exec_next(&mut parser, &mut builtin::prehook)?;
			match result.status {
				ExecStatus::EndOfInput => { break; },
				ExecStatus::Completed => {
					debug!(exit_code = ?result.exit_code, pipeline = result.is_pipeline, "completed");
					self.last_exit_code = result.exit_code;
				},
				ExecStatus::Background => {
					debug!(pipeline = result.is_pipeline, "started in background");
					self.last_exit_code = Some(0);
				},
				ExecStatus::Jobs(jobs) => {
					for (slot, job) in jobs {
						let mode = match job.mode {
							Mode::Foreground => "running",
							Mode::Background => "background",
						};
						let _ = writeln!(out, "[{}] {} {}", slot, job.pid, mode);
					}
					let _ = out.flush();
				},
				ExecStatus::Intercepted(Verb::Quit) => return Ok(Flow::Quit),
				ExecStatus::Intercepted(Verb::Halt) => return Ok(Flow::Halt),
				ExecStatus::Intercepted(Verb::Help) => {
					let _ = out.write_all(builtin::HELP.as_bytes());
					let _ = out.flush();
				},
				ExecStatus::Failed(e) => {
					let _ = writeln!(err, "nsh: {}", e);
					let _ = err.flush();
					self.last_exit_code = Some(1);
				},
			}
		}
		Ok(Flow::Continue)
	}
}
