use std::fmt;
use std::ops::Range;

use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Error)]
pub enum LexErrorKind {
	#[error("unterminated escape")]
	UnterminatedEscape,
	#[error("unterminated quote")]
	UnterminatedQuote,
	#[error("unexpected character {0:?}")]
	UnexpectedChar(char),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
	Word,
	QuotedWord,
	Pipe,
	Background,
	RedirectOut,
	RedirectIn,
	RedirectToAddress,
	RedirectFromAddress,
	Semicolon,
	Newline,
	EndOfInput,
	Error(LexErrorKind),
}

impl TokenKind {
	pub fn is_word(self) -> bool {
		match self {
			TokenKind::Word | TokenKind::QuotedWord => true,
			_ => false,
		}
	}

	pub fn is_terminator(self) -> bool {
		match self {
			TokenKind::Semicolon | TokenKind::Newline | TokenKind::EndOfInput => true,
			_ => false,
		}
	}
}

impl fmt::Display for TokenKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			TokenKind::Word => f.write_str("word"),
			TokenKind::QuotedWord => f.write_str("quoted word"),
			TokenKind::Pipe => f.write_str("`|`"),
			TokenKind::Background => f.write_str("`&`"),
			TokenKind::RedirectOut => f.write_str("`>`"),
			TokenKind::RedirectIn => f.write_str("`<`"),
			TokenKind::RedirectToAddress => f.write_str("`>@`"),
			TokenKind::RedirectFromAddress => f.write_str("`<@`"),
			TokenKind::Semicolon => f.write_str("`;`"),
			TokenKind::Newline => f.write_str("newline"),
			TokenKind::EndOfInput => f.write_str("end of input"),
			TokenKind::Error(ref e) => write!(f, "{}", e),
		}
	}
}

/// A tagged span of the input line. Tokens never copy text.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Token {
	pub kind: TokenKind,
	pub position: usize,
	pub length: usize,
}

impl Token {
	fn new(kind: TokenKind, position: usize, length: usize) -> Token {
		Token { kind: kind, position: position, length: length }
	}

	pub fn span(&self) -> Range<usize> {
		self.position .. self.position + self.length
	}
}

fn is_blank(c: char) -> bool {
	match c {
		' ' | '\t' | '\r' => true,
		_ => false,
	}
}

fn is_word_char(c: char) -> bool {
	match c {
		';' | '|' | '>' | '<' | '\'' | '&' | '#' | '\0' => false,
		_ => !c.is_whitespace(),
	}
}

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
	input: &'a str,
	position: usize,
}

impl<'a> Lexer<'a> {
	pub fn new(input: &'a str) -> Lexer<'a> {
		Lexer { input: input, position: 0 }
	}

	pub fn input(&self) -> &'a str {
		self.input
	}

	fn peek(&self) -> Option<char> {
		self.input[self.position ..].chars().next()
	}

	fn advance(&mut self) -> Option<char> {
		let c = self.peek()?;
		self.position += c.len_utf8();
		Some(c)
	}

	fn eat(&mut self, expected: char) -> bool {
		if self.peek() == Some(expected) {
			self.position += expected.len_utf8();
			true
		} else {
			false
		}
	}

	fn proceed_while<F>(&mut self, f: F) where F: Fn(char) -> bool {
		while let Some(c) = self.peek() {
			if !f(c) { break; }
			self.position += c.len_utf8();
		}
	}

	fn skip_comment(&mut self) {
		if self.eat('#') {
			self.proceed_while(|c| c != '\n');
		}
	}

	fn read_word(&mut self, start: usize) -> Token {
		loop {
			match self.peek() {
				Some('\\') => {
					self.position += 1;
					if self.advance().is_none() {
						return Token::new(TokenKind::Error(LexErrorKind::UnterminatedEscape), start, self.position - start);
					}
				},
				Some(c) if is_word_char(c) => { self.position += c.len_utf8(); },
				_ => { break; },
			}
		}
		Token::new(TokenKind::Word, start, self.position - start)
	}

	fn read_quoted_word(&mut self, start: usize) -> Token {
		self.position += 1;
		self.proceed_while(|c| c != '\'');
		if self.eat('\'') {
			Token::new(TokenKind::QuotedWord, start, self.position - start)
		} else {
			Token::new(TokenKind::Error(LexErrorKind::UnterminatedQuote), start, self.position - start)
		}
	}

	/// Returns the next token. Keeps returning `EndOfInput` once the input is exhausted.
	pub fn next_token(&mut self) -> Token {
		self.proceed_while(is_blank);
		self.skip_comment();

		let start = self.position;
		let c = match self.peek() {
			None => return Token::new(TokenKind::EndOfInput, start, 0),
			Some(c) => c,
		};
		if c == '\\' || is_word_char(c) {
			return self.read_word(start);
		}
		if c == '\'' {
			return self.read_quoted_word(start);
		}

		self.position += c.len_utf8();
		let kind = match c {
			'|' => TokenKind::Pipe,
			'&' => TokenKind::Background,
			';' => TokenKind::Semicolon,
			'\n' => TokenKind::Newline,
			'>' => if self.eat('@') { TokenKind::RedirectToAddress } else { TokenKind::RedirectOut },
			'<' => if self.eat('@') { TokenKind::RedirectFromAddress } else { TokenKind::RedirectIn },
			other => TokenKind::Error(LexErrorKind::UnexpectedChar(other)),
		};
		Token::new(kind, start, self.position - start)
	}
}
