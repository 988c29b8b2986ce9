use thiserror::Error;

use crate::types::{Command, CommandFlags};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Error)]
pub enum SemanticReason {
	#[error("address and file redirection of the same stream cannot be combined")]
	IoConflict,
	#[error("output redirection and pipe cannot be combined")]
	PipeConflict,
	#[error("pipe and background cannot be combined")]
	BackgroundConflict,
}

/// Checks a parsed command for mutually exclusive flags. The first rule
/// broken wins.
pub fn analyze(command: &Command) -> Result<(), SemanticReason> {
	let flags = command.flags;
	if flags.contains(CommandFlags::ADDRESS_IN | CommandFlags::FILE_IN) {
		return Err(SemanticReason::IoConflict);
	}
	if flags.contains(CommandFlags::ADDRESS_OUT | CommandFlags::FILE_OUT) {
		return Err(SemanticReason::IoConflict);
	}
	if flags.intersects(CommandFlags::ADDRESS_OUT | CommandFlags::FILE_OUT) && flags.contains(CommandFlags::PIPE) {
		return Err(SemanticReason::PipeConflict);
	}
	if flags.contains(CommandFlags::PIPE | CommandFlags::BACKGROUND) {
		return Err(SemanticReason::BackgroundConflict);
	}
	Ok(())
}
