use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::job::JobTable;

/// Handle on the state shared by every session of the process.
#[derive(Debug, Clone)]
pub struct State {
	pub jobs: Arc<JobTable>,
	pub running: Arc<AtomicBool>,
}

impl State {
	pub fn new() -> State {
		State { jobs: Arc::new(JobTable::new()), running: Arc::new(AtomicBool::new(true)) }
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	pub fn halt(&self) {
		self.running.store(false, Ordering::SeqCst);
	}
}

impl Default for State {
	fn default() -> State {
		State::new()
	}
}
