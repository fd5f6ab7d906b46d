use std::rc::Rc;

use thiserror::Error as ThisError;

/// Failures surfaced by the graph. All of them are reported
/// synchronously to whoever triggered the operation; nothing is
/// retried internally.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
	/// A signal write was attempted while a read-only computation was
	/// active. Computed values never permit writes; effects may opt in
	/// with [`Effect::allow_writes`](crate::Effect::allow_writes).
	#[error("invalid write: a read-only computation is active")]
	InvalidWrite,

	/// A node was read, directly or transitively, during its own
	/// computation. The computation is aborted and the node is left in
	/// the errored state.
	#[error("cyclic dependency: `{name}` was read during its own computation")]
	Cycle { name: &'static str },

	/// The privileged lookup ran outside any injection context.
	#[error("`{called}` requires an injection context: wrap the call in `run_in_context`")]
	MissingContext { called: &'static str },

	/// A user-supplied compute or effect function failed. The error
	/// reaches the triggering caller and the node retries cleanly on
	/// its next read or run.
	#[error("computation failed: {0}")]
	Computation(Rc<dyn std::error::Error>),
}

impl Error {
	pub fn computation(source: impl std::error::Error + 'static) -> Self {
		Error::Computation(Rc::new(source))
	}
}
