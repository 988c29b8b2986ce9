use thiserror::Error;

use crate::lexer::{LexErrorKind, Lexer, Token, TokenKind};
use crate::types::*;

#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum ParseError {
	#[error("{kind} at offset {position}")]
	Lex { kind: LexErrorKind, position: usize, length: usize },
	#[error("expected {expected} but found {found} at offset {position}")]
	Unexpected { expected: &'static str, found: TokenKind, position: usize },
	#[error("pipe at offset {position} is not followed by a command")]
	DanglingPipe { position: usize },
}

impl ParseError {
	pub fn position(&self) -> usize {
		match *self {
			ParseError::Lex { position, .. } => position,
			ParseError::Unexpected { position, .. } => position,
			ParseError::DanglingPipe { position } => position,
		}
	}
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Turns one input buffer into a stream of commands.
///
/// Each call to [`Parser::parse_next`] yields one command; a command that ends
/// in `|` is followed by the next stage of its pipeline.
pub struct Parser<'a> {
	lexer: Lexer<'a>,
	current: Token,
}

impl<'a> Parser<'a> {
	pub fn new(input: &'a str) -> Parser<'a> {
		let mut lexer = Lexer::new(input);
		let current = lexer.next_token();
		Parser { lexer: lexer, current: current }
	}

	fn advance(&mut self) {
		self.current = self.lexer.next_token();
	}

	fn eat(&mut self, kind: TokenKind) -> bool {
		if self.current.kind == kind {
			self.advance();
			true
		} else {
			false
		}
	}

	fn take_word(&mut self) -> Option<Slice<'a>> {
		let slice = Slice::from_token(self.lexer.input(), &self.current)?;
		self.advance();
		Some(slice)
	}

	fn unexpected(&self, expected: &'static str) -> ParseError {
		match self.current.kind {
			TokenKind::Error(kind) => ParseError::Lex { kind: kind, position: self.current.position, length: self.current.length },
			found => ParseError::Unexpected { expected: expected, found: found, position: self.current.position },
		}
	}

	fn recover(&mut self) {
		while self.current.kind != TokenKind::Newline && self.current.kind != TokenKind::EndOfInput {
			self.advance();
		}
	}

	fn parse_redirects(&mut self, command: &mut Command<'a>) -> ParseResult<()> {
		loop {
			let (flag, expected, slot) = match self.current.kind {
				TokenKind::RedirectIn => (CommandFlags::FILE_IN, "file name after `<`", &mut command.input_file),
				TokenKind::RedirectOut => (CommandFlags::FILE_OUT, "file name after `>`", &mut command.output_file),
				TokenKind::RedirectFromAddress => (CommandFlags::ADDRESS_IN, "address after `<@`", &mut command.input_address),
				TokenKind::RedirectToAddress => (CommandFlags::ADDRESS_OUT, "address after `>@`", &mut command.output_address),
				_ => { break; },
			};
			self.advance();
			let target = match self.take_word() {
				Some(target) => target,
				None => { return Err(self.unexpected(expected)); },
			};
			*slot = Some(target);
			command.flags |= flag;
		}
		Ok(())
	}

	fn parse_command(&mut self) -> ParseResult<Command<'a>> {
		let name = match self.take_word() {
			Some(name) => name,
			None => { return Err(self.unexpected("command name")); },
		};
		let mut command = Command::new(name);

		while let Some(arg) = self.take_word() {
			command.args.push(arg);
		}

		self.parse_redirects(&mut command)?;

		let trailer = self.current;
		if self.eat(TokenKind::Pipe) {
			command.flags |= CommandFlags::PIPE;
			if self.current.kind.is_terminator() {
				return Err(ParseError::DanglingPipe { position: trailer.position });
			}
		} else if self.eat(TokenKind::Background) {
			command.flags |= CommandFlags::BACKGROUND;
		} else if !self.current.kind.is_terminator() {
			return Err(self.unexpected("`|`, `&`, `;` or newline"));
		}

		Ok(command)
	}

	/// Discards the remaining stages of a pipeline after a stage that
	/// ended with `|` was rejected. Stops before the next separator, or
	/// just after a `&` trailer.
	pub fn skip_pipeline(&mut self) {
		loop {
			match self.current.kind {
				kind if kind.is_terminator() => { break; },
				TokenKind::Background => {
					self.advance();
					break;
				},
				_ => self.advance(),
			}
		}
	}

	/// Parses the next command.
	///
	/// `Ok(None)` means the input is exhausted. After an error the rest of
	/// the offending line is discarded, so the following call starts on the
	/// next line.
	pub fn parse_next(&mut self) -> ParseResult<Option<Command<'a>>> {
		while self.eat(TokenKind::Newline) || self.eat(TokenKind::Semicolon) {}
		if self.current.kind == TokenKind::EndOfInput {
			return Ok(None);
		}
		match self.parse_command() {
			Ok(command) => Ok(Some(command)),
			Err(e) => {
				self.recover();
				Err(e)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;

	fn names(command: &Command) -> (String, Vec<String>) {
		(command.name.value().into_owned(), command.args.iter().map(|a| a.value().into_owned()).collect())
	}

	#[test]
	fn simple_command() {
		let mut parser = Parser::new("echo hi");
		let command = parser.parse_next().unwrap().unwrap();
		assert_eq!(names(&command), ("echo".to_string(), vec!["hi".to_string()]));
		assert_eq!(command.flags, CommandFlags::empty());
		assert_eq!(parser.parse_next(), Ok(None));
	}

	#[test]
	fn separators_split_commands() {
		let mut parser = Parser::new(";; a 1\n\nb 2 ; c\n");
		let mut seen = vec![];
		while let Some(command) = parser.parse_next().unwrap() {
			seen.push(names(&command).0);
		}
		assert_eq!(seen, ["a", "b", "c"]);
	}

	#[test]
	fn pipeline_is_a_chain_of_piped_commands() {
		let mut parser = Parser::new("false | true");
		let first = parser.parse_next().unwrap().unwrap();
		assert!(first.is_piped());
		let second = parser.parse_next().unwrap().unwrap();
		assert_eq!(names(&second).0, "true");
		assert!(!second.is_piped());
		assert_eq!(parser.parse_next(), Ok(None));
	}

	#[test]
	fn background_trailer() {
		let mut parser = Parser::new("sleep 5 &");
		let command = parser.parse_next().unwrap().unwrap();
		assert!(command.is_background());
		assert_eq!(names(&command).1, ["5"]);
	}

	#[test]
	fn background_then_another_command() {
		let mut parser = Parser::new("sleep 1 & echo done");
		assert!(parser.parse_next().unwrap().unwrap().is_background());
		assert_eq!(names(&parser.parse_next().unwrap().unwrap()).0, "echo");
	}

	#[test]
	fn redirections_in_any_order() {
		let mut parser = Parser::new("sort -r > out.txt < in.txt");
		let command = parser.parse_next().unwrap().unwrap();
		assert_eq!(command.flags, CommandFlags::FILE_IN | CommandFlags::FILE_OUT);
		assert_eq!(command.input_file.unwrap().value(), "in.txt");
		assert_eq!(command.output_file.unwrap().value(), "out.txt");
		assert_eq!(names(&command).1, ["-r"]);
	}

	#[test]
	fn repeated_redirection_overwrites() {
		let mut parser = Parser::new("echo x > a > 'b c'");
		let command = parser.parse_next().unwrap().unwrap();
		assert_eq!(command.output_file.unwrap().value(), "b c");
	}

	#[test]
	fn address_redirections_are_parsed() {
		let mut parser = Parser::new("cat <@ 10.0.0.1:80 >@ host:9");
		let command = parser.parse_next().unwrap().unwrap();
		assert_eq!(command.flags, CommandFlags::ADDRESS_IN | CommandFlags::ADDRESS_OUT);
		assert_eq!(command.input_address.unwrap().value(), "10.0.0.1:80");
		assert_eq!(command.output_address.unwrap().value(), "host:9");
	}

	#[test]
	fn output_redirect_then_pipe_sets_both_flags() {
		let mut parser = Parser::new("ls > out.txt | wc");
		let command = parser.parse_next().unwrap().unwrap();
		assert!(command.flags.contains(CommandFlags::FILE_OUT | CommandFlags::PIPE));
	}

	#[test]
	fn missing_redirect_target() {
		let mut parser = Parser::new("echo a >\necho b");
		assert_matches!(parser.parse_next(), Err(ParseError::Unexpected { found: TokenKind::Newline, position: 8, .. }));
		assert_eq!(names(&parser.parse_next().unwrap().unwrap()).0, "echo");
		assert_eq!(parser.parse_next(), Ok(None));
	}

	#[test]
	fn dangling_pipe() {
		let mut parser = Parser::new("echo a |");
		assert_eq!(parser.parse_next(), Err(ParseError::DanglingPipe { position: 7 }));
		assert_eq!(parser.parse_next(), Ok(None));
	}

	#[test]
	fn pipe_and_background_are_not_both_consumed() {
		let mut parser = Parser::new("a | & b");
		assert!(parser.parse_next().unwrap().unwrap().is_piped());
		assert_matches!(parser.parse_next(), Err(ParseError::Unexpected { found: TokenKind::Background, .. }));
	}

	#[test]
	fn word_after_redirection_is_rejected() {
		let mut parser = Parser::new("cat < in extra");
		assert_matches!(parser.parse_next(), Err(ParseError::Unexpected { found: TokenKind::Word, position: 9, .. }));
	}

	#[test]
	fn unterminated_quote_then_next_line() {
		let mut parser = Parser::new("echo 'unterminated");
		assert_matches!(parser.parse_next(), Err(ParseError::Lex { kind: LexErrorKind::UnterminatedQuote, position: 5, .. }));
		assert_eq!(parser.parse_next(), Ok(None));

		let mut parser = Parser::new("echo ok");
		assert_eq!(names(&parser.parse_next().unwrap().unwrap()).0, "echo");
	}

	#[test]
	fn resynchronizes_on_newline() {
		let mut parser = Parser::new("echo \u{c} junk | more\nls -a\n| x\necho end");
		assert_matches!(parser.parse_next(), Err(ParseError::Lex { kind: LexErrorKind::UnexpectedChar('\u{c}'), .. }));
		assert_eq!(names(&parser.parse_next().unwrap().unwrap()), ("ls".to_string(), vec!["-a".to_string()]));
		assert_matches!(parser.parse_next(), Err(ParseError::Unexpected { expected: "command name", found: TokenKind::Pipe, .. }));
		assert_eq!(names(&parser.parse_next().unwrap().unwrap()).0, "echo");
		assert_eq!(parser.parse_next(), Ok(None));
	}

	#[test]
	fn comment_only_line() {
		let mut parser = Parser::new("   # nothing here");
		assert_eq!(parser.parse_next(), Ok(None));
	}

	#[test]
	fn skip_pipeline_stops_at_the_separator() {
		let mut parser = Parser::new("ls > x | wc -l | sort; echo next");
		assert!(parser.parse_next().unwrap().unwrap().is_piped());
		parser.skip_pipeline();
		assert_eq!(names(&parser.parse_next().unwrap().unwrap()).0, "echo");
		assert_eq!(parser.parse_next(), Ok(None));
	}

	#[test]
	fn skip_pipeline_consumes_a_background_trailer() {
		let mut parser = Parser::new("a | b < in & c\nd");
		parser.parse_next().unwrap().unwrap();
		parser.skip_pipeline();
		assert_eq!(names(&parser.parse_next().unwrap().unwrap()).0, "c");
		assert_eq!(names(&parser.parse_next().unwrap().unwrap()).0, "d");
	}
}
