use std::ffi::NulError;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::{fmt, io, ptr};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;
use tracing::{debug, warn};

use crate::job::{Insertion, Job, JobTable, JobTableError, Mode, State, WaitStatusExt};
use crate::parser::{ParseError, Parser};
use crate::semantic::{self, SemanticReason};
use crate::types::{Command, Slice};

/// Name of the built-in that lists the job table.
pub const JOBS: &str = "jobs";

pub const EXIT_NOT_FOUND: i32 = 127;
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectMode { Read, Write }

impl fmt::Display for RedirectMode {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			RedirectMode::Read => f.write_str("reading"),
			RedirectMode::Write => f.write_str("writing"),
		}
	}
}

/// Failure of one unit of work. The session keeps going after any of these.
#[derive(Debug, Error)]
pub enum ExecError {
	#[error("syntax error: {0}")]
	Parse(#[from] ParseError),
	#[error("semantic error: {0}")]
	Semantic(#[from] SemanticReason),
	#[error("redirection error: cannot open `{path}` for {mode}: {source}")]
	Redirection { mode: RedirectMode, path: String, #[source] source: io::Error },
	#[error("address redirection is not supported: `{0}`")]
	Unsupported(String),
	#[error("cannot spawn `{name}`: {source}")]
	Spawn { name: String, #[source] source: nix::Error },
	#[error("argument contains a NUL byte: {0}")]
	Argument(#[from] NulError),
}

/// Failure after which the job table can no longer be trusted.
#[derive(Debug, Error)]
pub enum FatalError {
	#[error("cannot query the status of process {pid}: {source}")]
	Wait { pid: Pid, #[source] source: nix::Error },
	#[error(transparent)]
	JobTable(#[from] JobTableError),
}

#[derive(Debug)]
pub enum ExecStatus<V> {
	/// Every foreground process of the unit has been waited for.
	Completed,
	/// The unit runs detached and is tracked in the job table.
	Background,
	EndOfInput,
	/// Live slots of the job table, for the `jobs` built-in.
	Jobs(Vec<(usize, Job)>),
	/// The prehook claimed the command.
	Intercepted(V),
	Failed(ExecError),
}

#[derive(Debug)]
pub struct ExecResult<V> {
	pub status: ExecStatus<V>,
	/// Only set when the reported process exited normally.
	pub exit_code: Option<i32>,
	pub is_background: bool,
	pub is_pipeline: bool,
}

impl<V> ExecResult<V> {
	fn new() -> ExecResult<V> {
		ExecResult { status: ExecStatus::Completed, exit_code: None, is_background: false, is_pipeline: false }
	}

	fn with_status(mut self, status: ExecStatus<V>) -> ExecResult<V> {
		self.status = status;
		self
	}

	fn failed<E: Into<ExecError>>(self, e: E) -> ExecResult<V> {
		self.with_status(ExecStatus::Failed(e.into()))
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProcessGroup {
	/// The child leads a group of its own.
	New,
	Join(Pid),
}

/// Standard streams handed to every process a session spawns. `None`
/// inherits the shell's own descriptor.
#[derive(Debug, Default)]
pub struct Streams {
	pub stdin: Option<OwnedFd>,
	pub stdout: Option<OwnedFd>,
	pub stderr: Option<OwnedFd>,
}

#[derive(Debug, Default)]
struct Stages {
	members: Vec<(usize, Pid)>,
}

impl Stages {
	fn is_empty(&self) -> bool {
		self.members.is_empty()
	}

	fn pids(&self) -> Vec<Pid> {
		self.members.iter().map(|&(_, pid)| pid).collect()
	}

	fn range(&self) -> Option<(usize, usize)> {
		match (self.members.first(), self.members.last()) {
			(Some(&(start, _)), Some(&(end, _))) => Some((start, end + 1)),
			_ => None,
		}
	}
}

/// Everything the child needs, prepared before forking so the child only
/// makes system calls.
struct Launch {
	/// NUL-terminated pointers into argument strings owned by the caller.
	argv: Vec<*const libc::c_char>,
	group: ProcessGroup,
	stdin: Option<RawFd>,
	stdout: Option<RawFd>,
	stderr: Option<RawFd>,
	not_found: Vec<u8>,
	not_executable: Vec<u8>,
}

fn write_stderr(msg: &[u8]) {
	unsafe {
		libc::write(libc::STDERR_FILENO, msg.as_ptr() as *const libc::c_void, msg.len());
	}
}

fn child_exit(status: i32) -> ! {
	unsafe { libc::_exit(status) }
}

fn exec_child(launch: &Launch) -> ! {
	let _ = SigSet::empty().thread_set_mask();
	unsafe {
		let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
		let _ = signal::signal(Signal::SIGTTOU, SigHandler::SigDfl);
	}
	let _ = match launch.group {
		ProcessGroup::New => unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)),
		ProcessGroup::Join(pgid) => unistd::setpgid(Pid::from_raw(0), pgid),
	};

	let wiring = [
		(launch.stdin, libc::STDIN_FILENO),
		(launch.stdout, libc::STDOUT_FILENO),
		(launch.stderr, libc::STDERR_FILENO),
	];
	for &(from, to) in wiring.iter() {
		if let Some(fd) = from {
			if unistd::dup2(fd, to).is_err() {
				write_stderr(b"nsh: cannot wire standard streams\n");
				child_exit(EXIT_NOT_EXECUTABLE);
			}
		}
	}

	unsafe {
		libc::execvp(launch.argv[0], launch.argv.as_ptr());
	}
	if Errno::last() == Errno::ENOENT {
		write_stderr(&launch.not_found);
		child_exit(EXIT_NOT_FOUND)
	} else {
		write_stderr(&launch.not_executable);
		child_exit(EXIT_NOT_EXECUTABLE)
	}
}

fn spawn(launch: &Launch) -> nix::Result<Pid> {
	match unsafe { unistd::fork() }? {
		ForkResult::Parent { child } => {
			let _ = match launch.group {
				ProcessGroup::New => unistd::setpgid(child, child),
				ProcessGroup::Join(pgid) => unistd::setpgid(child, pgid),
			};
			Ok(child)
		},
		ForkResult::Child => exec_child(launch),
	}
}

fn open_redirect(target: &Slice, mode: RedirectMode) -> Result<OwnedFd, ExecError> {
	let path = target.value();
	let opened = match mode {
		RedirectMode::Read => File::open(&*path),
		RedirectMode::Write => OpenOptions::new().write(true).create(true).truncate(true).mode(0o644).open(&*path),
	};
	match opened {
		Ok(file) => Ok(OwnedFd::from(file)),
		Err(e) => Err(ExecError::Redirection { mode: mode, path: path.into_owned(), source: e }),
	}
}

/// Runs parsed commands, one pipeline per call to [`Executor::exec_next`].
pub struct Executor {
	jobs: Arc<JobTable>,
	streams: Streams,
	terminal: bool,
	shell_pgid: Pid,
}

impl Executor {
	pub fn new(jobs: Arc<JobTable>) -> Executor {
		Executor { jobs: jobs, streams: Streams::default(), terminal: false, shell_pgid: unistd::getpgrp() }
	}

	pub fn streams(mut self, streams: Streams) -> Executor {
		self.streams = streams;
		self
	}

	/// Hands the controlling terminal to standalone foreground jobs.
	pub fn terminal(mut self, terminal: bool) -> Executor {
		self.terminal = terminal;
		self
	}

	pub fn jobs(&self) -> &Arc<JobTable> {
		&self.jobs
	}

	/// Parses and runs the next unit of work: one command, or one pipeline
	/// when commands are chained with `|`.
	///
	/// Errors that only concern this unit come back as
	/// [`ExecStatus::Failed`]; `Err` means the process should stop.
	pub fn exec_next<V, H>(&mut self, parser: &mut Parser, prehook: &mut H) -> Result<ExecResult<V>, FatalError>
	where H: FnMut(&Command) -> Option<V> {
		let mut result = ExecResult::new();
		let mut stages = Stages::default();
		let mut pipe_in: Option<OwnedFd> = None;

		loop {
			let command = match parser.parse_next() {
				Ok(Some(command)) => command,
				Ok(None) => {
					self.detach(&stages)?;
					return Ok(result.with_status(ExecStatus::EndOfInput));
				},
				Err(e) => {
					self.detach(&stages)?;
					return Ok(result.failed(e));
				},
			};

			if let Err(reason) = semantic::analyze(&command) {
				self.abort(parser, &command, &stages)?;
				return Ok(result.failed(reason));
			}

			if let Some(verb) = prehook(&command) {
				self.abort(parser, &command, &stages)?;
				return Ok(result.with_status(ExecStatus::Intercepted(verb)));
			}

			if stages.is_empty() && !command.is_piped() && command.name.value() == JOBS {
				return Ok(result.with_status(ExecStatus::Jobs(self.jobs.snapshot()?)));
			}

			if let Some(address) = command.input_address.or(command.output_address) {
				self.abort(parser, &command, &stages)?;
				return Ok(result.failed(ExecError::Unsupported(address.value().into_owned())));
			}

			result.is_background = result.is_background || command.is_background();
			result.is_pipeline = result.is_pipeline || command.is_piped();

			let stdin = match pipe_in.take() {
				Some(fd) => Some(fd),
				None => match command.input_file {
					Some(ref target) => match open_redirect(target, RedirectMode::Read) {
						Ok(fd) => Some(fd),
						Err(e) => {
							self.abort(parser, &command, &stages)?;
							return Ok(result.failed(e));
						},
					},
					_ => None,
				},
			};

			let (pipe_read, stdout) = if command.is_piped() {
				match unistd::pipe2(OFlag::O_CLOEXEC) {
					Ok((read, write)) => (Some(read), Some(write)),
					Err(e) => {
						self.abort(parser, &command, &stages)?;
						return Ok(result.failed(ExecError::Spawn { name: command.name.value().into_owned(), source: e }));
					},
				}
			} else {
				match command.output_file {
					Some(ref target) => match open_redirect(target, RedirectMode::Write) {
						Ok(fd) => (None, Some(fd)),
						Err(e) => {
							self.abort(parser, &command, &stages)?;
							return Ok(result.failed(e));
						},
					},
					None => (None, None),
				}
			};

			let argv = match command.argv() {
				Ok(argv) => argv,
				Err(e) => {
					self.abort(parser, &command, &stages)?;
					return Ok(result.failed(e));
				},
			};

			let standalone = stages.is_empty() && !command.is_piped() && !result.is_background;
			let group = if standalone { ProcessGroup::New } else { ProcessGroup::Join(self.shell_pgid) };
			let name = command.name.value();
			let launch = Launch {
				argv: argv.iter().map(|arg| arg.as_ptr()).chain(Some(ptr::null())).collect(),
				group: group,
				stdin: stdin.as_ref().or(self.streams.stdin.as_ref()).map(|fd| fd.as_raw_fd()),
				stdout: stdout.as_ref().or(self.streams.stdout.as_ref()).map(|fd| fd.as_raw_fd()),
				stderr: self.streams.stderr.as_ref().map(|fd| fd.as_raw_fd()),
				not_found: format!("nsh: command not found: {}\n", name).into_bytes(),
				not_executable: format!("nsh: cannot execute: {}\n", name).into_bytes(),
			};

			let pid = match spawn(&launch) {
				Ok(pid) => pid,
				Err(e) => {
					self.abort(parser, &command, &stages)?;
					return Ok(result.failed(ExecError::Spawn { name: name.into_owned(), source: e }));
				},
			};
			// the child holds its own copies now
			drop(stdin);
			drop(stdout);
			pipe_in = pipe_read;

			let insertion = if stages.is_empty() { Insertion::Append } else { Insertion::Next };
			let slot = self.jobs.insert(pid, insertion)?;
			debug!(%pid, slot, command = %name, ?group, "spawned");
			stages.members.push((slot, pid));

			if !command.is_piped() {
				break;
			}
		}

		if result.is_background {
			self.detach(&stages)?;
			return Ok(result.with_status(ExecStatus::Background));
		}

		let handoff = self.terminal && !result.is_pipeline;
		if handoff {
			self.give_terminal(stages.members[0].1);
		}
		let waited = self.wait_foreground(&stages);
		if handoff {
			self.give_terminal(unistd::getpgrp());
		}
		result.exit_code = waited?;
		Ok(result)
	}

	fn give_terminal(&self, pgid: Pid) {
		if unsafe { libc::tcsetpgrp(libc::STDIN_FILENO, pgid.as_raw()) } == -1 {
			debug!(%pgid, error = %Errno::last(), "cannot hand over the terminal");
		}
	}

	/// Waits for every stage in order and reports the exit code of the last one.
	fn wait_foreground(&self, stages: &Stages) -> Result<Option<i32>, FatalError> {
		if let Some((start, end)) = stages.range() {
			debug!(start, end, "waiting for jobs");
		}
		let mut exit_code = None;
		for pid in stages.pids() {
			let status = loop {
				match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
					Ok(status) => break status,
					Err(Errno::EINTR) => continue,
					Err(e) => return Err(FatalError::Wait { pid: pid, source: e }),
				}
			};
			exit_code = match status {
				WaitStatus::Exited(_, code) => Some(code),
				_ => None,
			};
			match status.state() {
				State::Stopped => {
					debug!(%pid, "stopped; keeping it as a background job");
					self.jobs.set_mode(pid, Mode::Background)?;
				},
				_ => {
					debug!(%pid, ?status, "finished");
					self.jobs.remove(pid)?;
				},
			}
		}
		Ok(exit_code)
	}

	/// Gives up on the unit at `command`: the stages after it are never
	/// parsed and the ones already running go to the reaper.
	fn abort(&self, parser: &mut Parser, command: &Command, stages: &Stages) -> Result<(), FatalError> {
		if command.is_piped() {
			parser.skip_pipeline();
		}
		self.detach(stages)
	}

	/// Hands already spawned stages over to the reaper.
	fn detach(&self, stages: &Stages) -> Result<(), FatalError> {
		for pid in stages.pids() {
			self.jobs.set_mode(pid, Mode::Background)?;
			match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
				Ok(WaitStatus::StillAlive) => {
					debug!(%pid, "running in background");
					if let Err(e) = unistd::setpgid(pid, self.shell_pgid) {
						debug!(%pid, error = %e, "cannot move into the background group");
					}
				},
				Ok(status) if status.state() == State::Terminated => {
					debug!(%pid, ?status, "already finished");
					self.jobs.remove_background(pid)?;
				},
				Ok(_) => {},
				Err(Errno::ECHILD) => {
					// collected by the reaper in the meantime
					self.jobs.remove_background(pid)?;
				},
				Err(e) => {
					warn!(%pid, error = %e, "cannot probe background job");
					return Err(FatalError::Wait { pid: pid, source: e });
				},
			}
		}
		Ok(())
	}
}
