use std::sync::{Mutex, MutexGuard};

use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum State { Active, Stopped, Terminated }

pub trait WaitStatusExt {
	fn state(self) -> State;
}

impl WaitStatusExt for WaitStatus {
	fn state(self) -> State {
		match self {
			WaitStatus::Exited(..) => State::Terminated,
			WaitStatus::Signaled(..) => State::Terminated,
			WaitStatus::Stopped(..) => State::Stopped,
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceEvent(..) | WaitStatus::PtraceSyscall(..) => State::Stopped,
			WaitStatus::Continued(..) => State::Active,
			WaitStatus::StillAlive => State::Active,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Mode {
	/// Waited for by the executor that spawned it.
	Foreground,
	/// Left to the reaper.
	Background,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Job {
	pub pid: Pid,
	pub mode: Mode,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Insertion {
	/// Reuse the lowest free slot, growing the table only when none is free.
	Append,
	/// Always grow at the end, so successive inserts get increasing slots.
	Next,
}

#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum JobTableError {
	#[error("process {pid} is already tracked in slot {slot}")]
	Duplicate { pid: Pid, slot: usize },
	#[error("job table lock is poisoned")]
	Poisoned,
}

pub type JobTableResult<T> = Result<T, JobTableError>;

/// Process-wide registry of the processes spawned by every session.
///
/// Every method holds the lock for exactly one operation and never across a
/// wait on a child.
#[derive(Debug, Default)]
pub struct JobTable {
	slots: Mutex<Vec<Option<Job>>>,
}

impl JobTable {
	pub fn new() -> JobTable {
		JobTable::default()
	}

	fn lock(&self) -> JobTableResult<MutexGuard<'_, Vec<Option<Job>>>> {
		self.slots.lock().map_err(|_| JobTableError::Poisoned)
	}

	pub fn insert(&self, pid: Pid, insertion: Insertion) -> JobTableResult<usize> {
		let mut slots = self.lock()?;
		if let Some(slot) = slots.iter().position(|s| s.map(|j| j.pid) == Some(pid)) {
			return Err(JobTableError::Duplicate { pid: pid, slot: slot });
		}
		let job = Job { pid: pid, mode: Mode::Foreground };
		if insertion == Insertion::Append {
			if let Some((i, space)) = slots.iter_mut().enumerate().find(|(_, s)| s.is_none()) {
				*space = Some(job);
				return Ok(i);
			}
		}
		slots.push(Some(job));
		Ok(slots.len() - 1)
	}

	/// Frees the slot holding `pid`, returning its index.
	pub fn remove(&self, pid: Pid) -> JobTableResult<Option<usize>> {
		let mut slots = self.lock()?;
		let found = slots.iter().position(|s| s.map(|j| j.pid) == Some(pid));
		if let Some(i) = found {
			slots[i] = None;
		}
		Ok(found)
	}

	/// Frees the slot holding `pid` only while it is a background job.
	pub fn remove_background(&self, pid: Pid) -> JobTableResult<Option<usize>> {
		let mut slots = self.lock()?;
		let found = slots.iter().position(|s| *s == Some(Job { pid: pid, mode: Mode::Background }));
		if let Some(i) = found {
			slots[i] = None;
		}
		Ok(found)
	}

	pub fn set_mode(&self, pid: Pid, mode: Mode) -> JobTableResult<bool> {
		let mut slots = self.lock()?;
		match slots.iter_mut().flatten().find(|j| j.pid == pid) {
			Some(job) => {
				job.mode = mode;
				Ok(true)
			},
			None => Ok(false),
		}
	}

	pub fn get(&self, slot: usize) -> JobTableResult<Option<Job>> {
		Ok(self.lock()?.get(slot).cloned().flatten())
	}

	pub fn contains(&self, pid: Pid) -> JobTableResult<bool> {
		Ok(self.lock()?.iter().flatten().any(|j| j.pid == pid))
	}

	/// Live slots in index order.
	pub fn snapshot(&self) -> JobTableResult<Vec<(usize, Job)>> {
		let slots = self.lock()?;
		Ok(slots.iter().enumerate().filter_map(|(i, s)| s.map(|j| (i, j))).collect())
	}

	pub fn background(&self) -> JobTableResult<Vec<Pid>> {
		let slots = self.lock()?;
		Ok(slots.iter().flatten().filter(|j| j.mode == Mode::Background).map(|j| j.pid).collect())
	}

	pub fn len(&self) -> JobTableResult<usize> {
		Ok(self.lock()?.iter().flatten().count())
	}

	pub fn is_empty(&self) -> JobTableResult<bool> {
		Ok(self.len()? == 0)
	}
}
