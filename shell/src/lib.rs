pub mod builtin;
pub mod client;
pub mod config;
pub mod eval;
pub mod global;
pub mod job;
pub mod lexer;
pub mod parser;
pub mod reaper;
pub mod repl;
pub mod semantic;
pub mod server;
pub mod session;
pub mod types;
