pub mod macros;

mod addr;
mod batch;
mod computed;
mod r#const;
mod context;
mod dependencies;
mod effect;
mod error;
mod evaluation;
mod signal;
mod value;

use std::rc::{Rc, Weak};

pub use batch::{batch, clear_scheduler, epoch, flush, in_batch, set_scheduler};
pub use computed::{ComputeFn, Computed};
pub use context::{
	assert_in_context, current_resolver, inject_override, run_in_context, with_inject_override,
	InjectFn, Resolver,
};
pub use dependencies::Dependencies;
pub use effect::{Effect, EffectFn, Effects};
pub use error::Error;
pub use evaluation::Evaluation;
pub use r#const::Const;
pub use signal::{EqualFn, Signal, Toggle};
pub use value::{Access, Ref, Value};

pub trait Derived: 'static {
	fn invalidate(self: Rc<Self>, invalid: Invalid);
}

pub trait Observable: 'static {
	/// This function is called when we want
	/// this observable to bring itself up to date.
	fn update(&self) -> Result<Version, Error>;

	/// This function should return the current
	/// version, without recomputing anything.
	fn version(&self) -> Version;

	/// Notify this observable that `derived` started
	/// to listen.
	fn used_by(&self, derived: Weak<dyn Derived>);

	/// Notify this observable that `derived` stopped
	/// to listen.
	fn not_used_by(&self, derived: &Weak<dyn Derived>);
}

/// A consumer the scheduler can re-run.
pub trait Reactive: 'static {
	fn run(&self) -> Result<(), Error>;
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum State {
	Valid,
	Invalid(Invalid),
	Computing,
	Errored,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Invalid {
	Maybe,
	Definitely,
}

/// Per-node change counter. Strictly increases on every observable
/// value change and never wraps within a process lifetime.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Default)]
pub struct Version(u64);

impl Version {
	pub const ZERO: Version = Version(0);

	#[must_use]
	pub(crate) fn next(self) -> Version {
		Version(self.0 + 1)
	}
}

/// Thread-global write generation. Advances once per top-level write
/// batch and lets consumers skip staleness checks they already passed
/// this generation.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct Epoch(u64);

impl Epoch {
	/// No consumer has ever been verified at this epoch.
	pub(crate) const UNSEEN: Epoch = Epoch(0);
	pub(crate) const FIRST: Epoch = Epoch(1);

	#[must_use]
	pub(crate) fn next(self) -> Epoch {
		Epoch(self.0 + 1)
	}
}
