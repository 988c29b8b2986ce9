use crate::types::Command;

/// Session-level verbs, intercepted before the executor spawns anything.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Verb {
	Quit,
	Halt,
	Help,
}

pub const HELP: &str = "\
commands:
  name args... [< file] [> file]    run a program
  a | b | c                         pipeline; reports the exit code of c
  cmd &                             run in the background
  a ; b  or newline                 run one after the other
  'quoted words'  escaped\\ words   # comments
  >@ addr, <@ addr                  address redirection (not supported)
built-ins:
  jobs     list tracked processes
  help     show this text
  quit     end this session (also: exit)
  halt     end this session and stop the server
";

pub fn match_verb(name: &str) -> Option<Verb> {
	match name {
		"quit" | "exit" => Some(Verb::Quit),
		"halt" => Some(Verb::Halt),
		"help" => Some(Verb::Help),
		_ => None,
	}
}

pub fn prehook(command: &Command) -> Option<Verb> {
	match_verb(&command.name.value())
}
