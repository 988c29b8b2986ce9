use std::fs;
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nsh::eval::Executor;
use nsh::job::JobTable;
use nsh::reaper;
use nsh::session::{Flow, Session};
use tempfile::TempDir;

struct Run {
	flow: Flow,
	out: String,
	err: String,
}

fn session() -> Session {
	Session::new(Executor::new(Arc::new(JobTable::new())))
}

fn run(session: &mut Session, line: &str) -> Run {
	let mut out = vec![];
	let mut err = vec![];
	let flow = session.run_line(line, &mut out, &mut err).unwrap();
	Run { flow: flow, out: String::from_utf8(out).unwrap(), err: String::from_utf8(err).unwrap() }
}

#[test]
fn verbs_end_the_session() {
	assert_eq!(run(&mut session(), "quit").flow, Flow::Quit);
	assert_eq!(run(&mut session(), "exit").flow, Flow::Quit);
	assert_eq!(run(&mut session(), "halt").flow, Flow::Halt);
	assert_eq!(run(&mut session(), "true").flow, Flow::Continue);
}

#[test]
fn quit_stops_the_rest_of_the_line() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("never.txt");
	let result = run(&mut session(), &format!("quit; echo late > {}", path.display()));
	assert_eq!(result.flow, Flow::Quit);
	assert!(!path.exists());
}

#[test]
fn help_goes_to_out() {
	let result = run(&mut session(), "help");
	assert!(result.out.contains("built-ins"));
	assert!(result.err.is_empty());
}

#[test]
fn errors_are_reported_one_line_each() {
	let mut session = session();
	let result = run(&mut session, "ls > listing.txt | wc");
	assert_eq!(result.err, "nsh: semantic error: output redirection and pipe cannot be combined\n");
	assert_eq!(result.flow, Flow::Continue);

	let result = run(&mut session, "ls |");
	assert_eq!(result.err, "nsh: syntax error: pipe at offset 3 is not followed by a command\n");

	let result = run(&mut session, "cat < /nonexistent/input.txt");
	assert!(result.err.starts_with("nsh: redirection error: cannot open `/nonexistent/input.txt` for reading: "));

	let result = run(&mut session, "cat <@ localhost:1; cat 'open");
	assert_eq!(result.err.lines().count(), 2);
	assert!(result.err.lines().all(|line| line.starts_with("nsh: ")));
}

#[test]
fn rejected_stage_stops_its_pipeline() {
	let dir = TempDir::new().unwrap();
	let marker = dir.path().join("marker.txt");
	let mut session = session();
	let line = format!("ls > {} | sh -c 'echo spawned > {}'", dir.path().join("x").display(), marker.display());
	let result = run(&mut session, &line);
	assert_eq!(result.err, "nsh: semantic error: output redirection and pipe cannot be combined\n");
	assert_eq!(result.flow, Flow::Continue);
	assert!(!marker.exists());
}

#[test]
fn exit_codes_are_tracked() {
	let mut session = session();
	run(&mut session, "true; false");
	assert_eq!(session.last_exit_code(), Some(1));
	run(&mut session, "false | true");
	assert_eq!(session.last_exit_code(), Some(0));
}

#[test]
fn later_commands_run_after_an_error() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("after.txt");
	let result = run(&mut session(), &format!("cat < /nonexistent/input.txt; echo after > {}", path.display()));
	assert_eq!(result.err.lines().count(), 1);
	assert_eq!(fs::read_to_string(&path).unwrap(), "after\n");
}

#[test]
fn jobs_lists_background_processes() {
	let jobs = Arc::new(JobTable::new());
	let mut session = Session::new(Executor::new(Arc::clone(&jobs)));
	let result = run(&mut session, "sleep 5 &; jobs");
	let pid = jobs.snapshot().unwrap()[0].1.pid;
	assert_eq!(result.out, format!("[0] {} background\n", pid));

	kill(pid, Signal::SIGKILL).unwrap();
	let deadline = Instant::now() + Duration::from_secs(10);
	while !jobs.is_empty().unwrap() && Instant::now() < deadline {
		reaper::reap(&jobs).unwrap();
		sleep(Duration::from_millis(20));
	}
	assert_eq!(jobs.is_empty(), Ok(true));
}
