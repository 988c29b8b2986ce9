use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nix::errno::Errno;
use nix::sys::signal::{SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::job::{JobTable, JobTableResult, State, WaitStatusExt};

/// Blocks `signals` on the calling thread.
///
/// Call this from the main thread before any other thread is started, so
/// every thread inherits the mask and the signals are only ever consumed by
/// the thread started with [`spawn`].
pub fn block(signals: &[Signal]) -> nix::Result<SigSet> {
	let mut set = SigSet::empty();
	for &signal in signals {
		set.add(signal);
	}
	set.thread_block()?;
	Ok(set)
}

/// Collects every background job that has terminated.
///
/// The lock is released while the children are probed.
pub fn reap(jobs: &JobTable) -> JobTableResult<Vec<(Pid, WaitStatus)>> {
	let mut reaped = vec![];
	for pid in jobs.background()? {
		match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
			Ok(status) if status.state() == State::Terminated => {
				jobs.remove_background(pid)?;
				match status {
					WaitStatus::Exited(_, code) => info!(%pid, code, "background job exited"),
					_ => info!(%pid, ?status, "background job terminated"),
				}
				reaped.push((pid, status));
			},
			Ok(_) => {},
			Err(Errno::ECHILD) => {
				// already collected by the executor that detached it
				jobs.remove_background(pid)?;
			},
			Err(e) => {
				warn!(%pid, error = %e, "cannot probe background job");
			},
		}
	}
	Ok(reaped)
}

/// Starts the thread that waits for the signals in `set`.
///
/// `SIGCHLD` triggers [`reap`]; `SIGINT` clears `running` when one is given.
pub fn spawn(jobs: Arc<JobTable>, set: SigSet, running: Option<Arc<AtomicBool>>) -> io::Result<JoinHandle<()>> {
	thread::Builder::new().name("reaper".into()).spawn(move || {
		loop {
			match set.wait() {
				Ok(Signal::SIGCHLD) => {
					if let Err(e) = reap(&jobs) {
						warn!(error = %e, "reaper stopped");
						return;
					}
				},
				Ok(Signal::SIGINT) => match running {
					Some(ref running) => {
						info!("interrupted; no longer accepting connections");
						running.store(false, Ordering::SeqCst);
					},
					None => debug!("ignoring SIGINT"),
				},
				Ok(signal) => debug!(?signal, "unexpected signal"),
				Err(e) => warn!(error = %e, "sigwait failed"),
			}
		}
	})
}
