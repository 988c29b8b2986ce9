use std::borrow::Cow;
use std::ffi::{CString, NulError};
use std::fmt;

use bitflags::bitflags;

use crate::lexer::{Token, TokenKind};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Quoting { Bare, Quoted }

/// Borrowed view of one word in the input line.
///
/// A bare word keeps its backslashes in the source text; they are only
/// collapsed when the value is asked for.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Slice<'a> {
	source: &'a str,
	start: usize,
	len: usize,
	quoting: Quoting,
}

impl<'a> Slice<'a> {
	pub fn from_token(source: &'a str, token: &Token) -> Option<Slice<'a>> {
		match token.kind {
			TokenKind::Word => Some(Slice { source: source, start: token.position, len: token.length, quoting: Quoting::Bare }),
			TokenKind::QuotedWord => Some(Slice { source: source, start: token.position + 1, len: token.length - 2, quoting: Quoting::Quoted }),
			_ => None,
		}
	}

	pub fn position(&self) -> usize {
		self.start
	}

	pub fn raw(&self) -> &'a str {
		&self.source[self.start .. self.start + self.len]
	}

	pub fn value(&self) -> Cow<'a, str> {
		let raw = self.raw();
		if self.quoting == Quoting::Quoted || !raw.contains('\\') {
			return Cow::Borrowed(raw);
		}
		let mut value = String::with_capacity(raw.len());
		let mut chars = raw.chars();
		while let Some(c) = chars.next() {
			if c == '\\' {
				// the lexer never ends a word on a lone backslash
				if let Some(escaped) = chars.next() {
					value.push(escaped);
				}
			} else {
				value.push(c);
			}
		}
		Cow::Owned(value)
	}

	pub fn to_cstring(&self) -> Result<CString, NulError> {
		CString::new(self.value().into_owned())
	}
}

impl<'a> fmt::Display for Slice<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(&self.value())
	}
}

bitflags! {
	#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
	pub struct CommandFlags: u8 {
		const FILE_IN = 1;
		const FILE_OUT = 1 << 1;
		const ADDRESS_IN = 1 << 2;
		const ADDRESS_OUT = 1 << 3;
		const BACKGROUND = 1 << 4;
		const PIPE = 1 << 5;
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Command<'a> {
	pub name: Slice<'a>,
	pub args: Vec<Slice<'a>>,
	pub input_file: Option<Slice<'a>>,
	pub output_file: Option<Slice<'a>>,
	pub input_address: Option<Slice<'a>>,
	pub output_address: Option<Slice<'a>>,
	pub flags: CommandFlags,
}

impl<'a> Command<'a> {
	pub fn new(name: Slice<'a>) -> Command<'a> {
		Command {
			name: name,
			args: vec![],
			input_file: None,
			output_file: None,
			input_address: None,
			output_address: None,
			flags: CommandFlags::empty(),
		}
	}

	pub fn is_piped(&self) -> bool {
		self.flags.contains(CommandFlags::PIPE)
	}

	pub fn is_background(&self) -> bool {
		self.flags.contains(CommandFlags::BACKGROUND)
	}

	/// Argument vector handed to exec: the name followed by the arguments.
	pub fn argv(&self) -> Result<Vec<CString>, NulError> {
		let mut argv = Vec::with_capacity(self.args.len() + 1);
		argv.push(self.name.to_cstring()?);
		for arg in &self.args {
			argv.push(arg.to_cstring()?);
		}
		Ok(argv)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::Lexer;

	fn first_slice(source: &str) -> Slice {
		let token = Lexer::new(source).next_token();
		Slice::from_token(source, &token).unwrap()
	}

	#[test]
	fn bare_word_without_escape_is_borrowed() {
		let slice = first_slice("hello world");
		assert_eq!(slice.raw(), "hello");
		assert!(matches!(slice.value(), Cow::Borrowed("hello")));
	}

	#[test]
	fn escapes_collapse_lazily() {
		let slice = first_slice(r"a\ b\\c\;d");
		assert_eq!(slice.raw(), r"a\ b\\c\;d");
		assert_eq!(slice.value(), r"a b\c;d");
		assert_eq!(slice.raw(), r"a\ b\\c\;d");
	}

	#[test]
	fn quoted_word_is_literal() {
		let slice = first_slice(r"'a \n | b'");
		assert_eq!(slice.value(), r"a \n | b");
		assert_eq!(slice.position(), 1);
	}

	#[test]
	fn empty_quoted_word() {
		let slice = first_slice("''");
		assert_eq!(slice.value(), "");
	}

	#[test]
	fn argv_starts_with_name() {
		let source = "ls -l 'my dir'";
		let mut lexer = Lexer::new(source);
		let name = Slice::from_token(source, &lexer.next_token()).unwrap();
		let mut command = Command::new(name);
		command.args.push(Slice::from_token(source, &lexer.next_token()).unwrap());
		command.args.push(Slice::from_token(source, &lexer.next_token()).unwrap());
		let argv = command.argv().unwrap();
		let argv: Vec<&str> = argv.iter().map(|a| a.to_str().unwrap()).collect();
		assert_eq!(argv, ["ls", "-l", "my dir"]);
	}

	#[test]
	fn flags_helpers() {
		let mut command = Command::new(first_slice("cat"));
		assert!(!command.is_piped());
		command.flags |= CommandFlags::PIPE;
		assert!(command.is_piped());
		assert!(!command.is_background());
	}
}
