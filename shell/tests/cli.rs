use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

const NSH: &str = env!("CARGO_BIN_EXE_nsh");

fn with_stdin(args: &[&str], input: &str) -> Output {
	let mut child = Command::new(NSH)
		.args(args)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.unwrap();
	child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
	child.wait_with_output().unwrap()
}

#[test]
fn runs_a_script_file() {
	let dir = TempDir::new().unwrap();
	let script = dir.path().join("build.nsh");
	let output_file = dir.path().join("out.txt");
	fs::write(&script, format!("\
# comments and blank lines are skipped

echo one; echo two | tr a-z A-Z
echo three > {}
", output_file.display())).unwrap();

	let output = Command::new(NSH).arg(&script).output().unwrap();
	assert!(output.status.success());
	assert_eq!(String::from_utf8_lossy(&output.stdout), "one\nTWO\n");
	assert_eq!(fs::read_to_string(&output_file).unwrap(), "three\n");
}

#[test]
fn reads_commands_from_piped_stdin() {
	let output = with_stdin(&[], "echo piped\nls > x | wc\necho after\n");
	assert_eq!(String::from_utf8_lossy(&output.stdout), "piped\nafter\n");
	assert!(String::from_utf8_lossy(&output.stderr).contains("nsh: semantic error: output redirection and pipe cannot be combined"));
}

#[test]
fn exit_status_follows_the_last_command() {
	assert_eq!(with_stdin(&[], "true\nsh -c 'exit 4'\n").status.code(), Some(4));
	assert_eq!(with_stdin(&[], "false\nquit\necho never\n").status.code(), Some(1));
}

#[test]
fn about_flag() {
	let output = Command::new(NSH).arg("-a").output().unwrap();
	assert!(output.status.success());
	assert!(String::from_utf8_lossy(&output.stdout).starts_with("nsh "));
}

#[test]
fn missing_script_fails() {
	let output = Command::new(NSH).arg("/nonexistent/script.nsh").output().unwrap();
	assert_eq!(output.status.code(), Some(1));
	assert!(String::from_utf8_lossy(&output.stderr).contains("cannot open script"));
}

#[test]
fn server_and_client_cannot_be_combined() {
	let output = Command::new(NSH).args(["-s", "-c"]).output().unwrap();
	assert!(!output.status.success());
}
