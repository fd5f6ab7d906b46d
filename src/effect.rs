use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::batch::schedule;
use crate::dependencies::Dependencies;
use crate::evaluation::{Evaluation, WriteScope};
use crate::{Derived, Error, Invalid, Reactive, State};

pub type EffectFn = Box<dyn Fn(&Evaluation) -> Result<(), Error>>;

/// A side-effecting consumer. Instead of being read, it is scheduled
/// for re-execution whenever one of its dependencies changes; the
/// scheduler (or [`flush`](crate::flush)) runs it later. The handle
/// keeps the effect alive: dropping every clone detaches it, and
/// [`Effect::dispose`] does so explicitly.
#[derive(Clone)]
pub struct Effect {
	pub(crate) body: Rc<EffectBody>,
}

pub struct EffectBody {
	// Kept outside `inner` so an invalidation arriving from a write
	// performed by this very effect's run needs no borrow.
	state: Cell<State>,
	disposed: Cell<bool>,
	allow_writes: Cell<bool>,
	inner: RefCell<EffectInner>,
}

pub struct EffectInner {
	name: &'static str,
	func: EffectFn,
	dependencies: Dependencies,
	this: Weak<EffectBody>,
}

impl Drop for EffectInner {
	fn drop(&mut self) {
		let refr = self.this.clone() as Weak<dyn Derived>;
		self.dependencies.drop_edges(&refr)
	}
}

impl Effect {
	#[must_use]
	pub fn new(func: EffectFn) -> Self {
		Self::new_with_name("<unnamed>", func)
	}

	/// Effects start dirty and scheduled; the first run establishes
	/// the dependency set.
	#[must_use]
	pub fn new_with_name(name: &'static str, func: EffectFn) -> Self {
		let effect = Effect {
			body: Rc::new_cyclic(|this| EffectBody {
				state: Cell::new(State::Invalid(Invalid::Definitely)),
				disposed: Cell::new(false),
				allow_writes: Cell::new(false),
				inner: RefCell::new(EffectInner {
					func,
					name,
					dependencies: Dependencies::new(),
					this: this.clone(),
				}),
			}),
		};

		schedule(Rc::downgrade(&effect.body) as Weak<dyn Reactive>);

		effect
	}

	/// Permit signal writes while this effect runs. A write into one
	/// of the effect's own dependencies re-schedules it; feedback
	/// loops built that way are the caller's risk and are not
	/// detected.
	#[must_use]
	pub fn allow_writes(self) -> Self {
		self.body.allow_writes.set(true);
		self
	}

	pub fn run(&self) -> Result<(), Error> {
		self.body.run()
	}

	/// Detach this effect from every producer and cancel any pending
	/// scheduled run. Terminal and idempotent: later dependency
	/// changes and `run` calls are silently ignored.
	pub fn dispose(&self) {
		self.body.dispose();
	}
}

impl EffectBody {
	fn run(&self) -> Result<(), Error> {
		if self.disposed.get() {
			return Ok(());
		}

		let definitely = match self.state.get() {
			State::Valid => return Ok(()),
			State::Computing => {
				return Err(Error::Cycle {
					name: self.inner.borrow().name,
				})
			}
			State::Errored => true,
			State::Invalid(Invalid::Definitely) => true,
			State::Invalid(Invalid::Maybe) => false,
		};

		if !definitely {
			match self.inner.borrow().dependencies.are_valid() {
				Ok(true) => {
					self.state.set(State::Valid);
					return Ok(());
				}
				Ok(false) => {}
				Err(error) => {
					self.state.set(State::Errored);
					return Err(error);
				}
			}
		}

		self.state.set(State::Computing);

		let this = self.inner.borrow().this.clone() as Weak<dyn Derived>;
		let evaluation = Evaluation::new(this.clone());

		let result = {
			let _scope = WriteScope::new(self.allow_writes.get());
			let self_ref = self.inner.borrow();
			(self_ref.func)(&evaluation)
		};

		self.inner
			.borrow_mut()
			.dependencies
			.swap(evaluation.take(), &this);

		match result {
			Ok(()) => {
				// A write from this very run may have marked the
				// effect invalid again; leave that mark in place so
				// the queued re-run happens.
				if self.state.get() == State::Computing {
					self.state.set(State::Valid);
				}
				Ok(())
			}
			Err(error) => {
				self.state.set(State::Errored);
				Err(error)
			}
		}
	}

	fn dispose(&self) {
		if self.disposed.replace(true) {
			return;
		}

		tracing::trace!(name = self.inner.borrow().name, "disposing effect");

		let mut self_mut = self.inner.borrow_mut();
		let refr = self_mut.this.clone() as Weak<dyn Derived>;
		self_mut.dependencies.drop_edges(&refr);
	}
}

impl Reactive for EffectBody {
	fn run(&self) -> Result<(), Error> {
		EffectBody::run(self)
	}
}

impl Derived for EffectBody {
	fn invalidate(self: Rc<Self>, invalid: Invalid) {
		if self.disposed.get() {
			return;
		}

		match self.state.get() {
			State::Valid | State::Errored | State::Computing => {
				self.state.set(State::Invalid(invalid));
				tracing::trace!(name = self.inner.borrow().name, "scheduling effect");
				schedule(Rc::downgrade(&self) as Weak<dyn Reactive>);
			}
			// Already marked means already queued.
			State::Invalid(_) => {}
		}
	}
}

/// Keeps a group of effects alive together. Components collect the
/// effects they create here and dispose the lot on teardown.
#[derive(Default, Clone)]
pub struct Effects<const N: usize> {
	vec: smallvec::SmallVec<[Effect; N]>,
}

impl<const N: usize> Effects<N> {
	pub fn add(&mut self, effect: Effect) {
		self.vec.push(effect);
	}

	pub fn run(&self) -> Result<(), Error> {
		for effect in &self.vec {
			effect.run()?;
		}

		Ok(())
	}

	pub fn dispose(&self) {
		for effect in &self.vec {
			effect.dispose();
		}
	}
}

impl std::fmt::Debug for Effect {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Effect")
			.field("name", &self.body.inner.borrow().name)
			.finish()
	}
}
