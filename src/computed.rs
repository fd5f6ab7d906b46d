use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use fxhash::FxHashSet;

use crate::addr::WeakAddr;
use crate::batch::epoch;
use crate::dependencies::Dependencies;
use crate::evaluation::{Evaluation, WriteScope};
use crate::signal::EqualFn;
use crate::value::Access;
use crate::{Derived, Epoch, Error, Invalid, Observable, State, Value, Version};

pub type ComputeFn<T> = Box<dyn Fn(&Evaluation) -> Result<T, Error>>;

/// A memoizing derivation. A consumer of the producers it reads and a
/// producer for its own dependents. Recomputes lazily, on read, and
/// only when a recorded dependency version no longer matches.
pub struct Computed<T>
where
	T: 'static,
{
	body: Rc<ComputedBody<T>>,
}

impl<T: 'static> Clone for Computed<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T: 'static> From<Computed<T>> for Rc<dyn Any> {
	fn from(computed: Computed<T>) -> Self {
		computed.body
	}
}

impl<T: 'static> TryFrom<Rc<dyn Any>> for Computed<T> {
	type Error = Rc<dyn Any>;
	fn try_from(value: Rc<dyn Any>) -> Result<Self, Self::Error> {
		Rc::downcast::<ComputedBody<T>>(value).map(|body| Computed { body })
	}
}

pub struct ComputedBody<T>
where
	T: 'static,
{
	value: RefCell<Option<T>>,
	version: Cell<Version>,
	// Kept outside `inner` so a reentrant read can be answered with a
	// cycle error before any borrow is taken.
	state: Cell<State>,
	last_clean: Cell<Epoch>,
	inner: RefCell<ComputedInner<T>>,
}

struct ComputedInner<T>
where
	T: 'static,
{
	name: &'static str,
	func: ComputeFn<T>,
	equal: EqualFn<T>,
	used_by: FxHashSet<WeakAddr<dyn Derived>>,
	dependencies: Dependencies,
	this: Weak<ComputedBody<T>>,
}

impl<T> Drop for ComputedInner<T>
where
	T: 'static,
{
	fn drop(&mut self) {
		let refr = self.this.clone() as Weak<dyn Derived>;
		self.dependencies.drop_edges(&refr);
	}
}

impl<T> Computed<T>
where
	T: 'static,
{
	pub fn new(func: ComputeFn<T>) -> Self
	where
		T: PartialEq,
	{
		Self::with_equal("<computed>", func, Box::new(|a, b| a == b))
	}

	pub fn new_with_name(name: &'static str, func: ComputeFn<T>) -> Self
	where
		T: PartialEq,
	{
		Self::with_equal(name, func, Box::new(|a, b| a == b))
	}

	pub fn with_equal(name: &'static str, func: ComputeFn<T>, equal: EqualFn<T>) -> Self {
		Computed {
			body: Rc::new_cyclic(|this| ComputedBody {
				value: RefCell::new(None),
				version: Cell::new(Version::ZERO),
				state: Cell::new(State::Invalid(Invalid::Definitely)),
				last_clean: Cell::new(Epoch::UNSEEN),
				inner: RefCell::new(ComputedInner {
					name,
					func,
					equal,
					used_by: FxHashSet::default(),
					dependencies: Dependencies::new(),
					this: this.clone(),
				}),
			}),
		}
	}

	#[inline]
	pub fn get_once(&self) -> Result<Ref<'_, T>, Error> {
		self.body.get_once()
	}

	#[inline]
	pub fn get<'a>(&'a self, eval: &'a impl AsRef<Evaluation>) -> Result<Ref<'a, T>, Error> {
		self.body.get(eval.as_ref())
	}

	/// A read-only view over this computed. Same underlying node.
	pub fn read_only(&self) -> Value<T> {
		Value::new(self.body.clone())
	}
}

impl<T> ComputedBody<T>
where
	T: 'static,
{
	pub(crate) fn get_once(&self) -> Result<Ref<'_, T>, Error> {
		self.refresh()?;
		Ok(self.cached())
	}

	pub(crate) fn get<'a>(&'a self, eval: &'_ Evaluation) -> Result<Ref<'a, T>, Error> {
		self.refresh()?;

		{
			let mut self_mut = self.inner.borrow_mut();
			eval.based_on(self_mut.this.upgrade().unwrap(), self.version.get());
			self_mut.used_by(eval.parent());
		}

		Ok(self.cached())
	}

	fn cached(&self) -> Ref<'_, T> {
		Ref::map(self.value.borrow(), |value| value.as_ref().unwrap())
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		self.inner.borrow_mut().used_by(derived);
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		self.inner.borrow_mut().not_used_by(derived);
	}

	/// Verify this node is current, recomputing at most once.
	fn refresh(&self) -> Result<(), Error> {
		let current = epoch();

		let definitely = match self.state.get() {
			State::Computing => {
				return Err(Error::Cycle {
					name: self.inner.borrow().name,
				})
			}
			State::Valid if self.last_clean.get() == current => return Ok(()),
			State::Valid => {
				self.last_clean.set(current);
				return Ok(());
			}
			State::Errored => true,
			State::Invalid(Invalid::Definitely) => true,
			State::Invalid(Invalid::Maybe) => false,
		};

		if !definitely {
			let valid = self.inner.borrow().dependencies.are_valid();

			match valid {
				Ok(true) => {
					self.state.set(State::Valid);
					self.last_clean.set(current);
					return Ok(());
				}
				Ok(false) => {}
				Err(error) => {
					self.state.set(State::Errored);
					return Err(error);
				}
			}
		}

		tracing::trace!(name = self.inner.borrow().name, "recomputing");

		self.state.set(State::Computing);

		let this = self.inner.borrow().this.clone() as Weak<dyn Derived>;
		let evaluation = Evaluation::new(this.clone());

		let result = {
			// Computed values never permit writes during their own
			// evaluation.
			let _scope = WriteScope::new(false);
			let self_ref = self.inner.borrow();
			(self_ref.func)(&evaluation)
		};

		let mut self_mut = self.inner.borrow_mut();
		self_mut.dependencies.swap(evaluation.take(), &this);

		match result {
			Ok(value) => {
				let changed = match self.value.borrow().as_ref() {
					Some(old) => !(self_mut.equal)(old, &value),
					None => true,
				};

				*self.value.borrow_mut() = Some(value);

				if changed {
					self.version.set(self.version.get().next());
				}

				self.state.set(State::Valid);
				self.last_clean.set(current);

				Ok(())
			}
			Err(error) => {
				self.state.set(State::Errored);
				Err(error)
			}
		}
	}
}

impl<T> ComputedInner<T>
where
	T: 'static,
{
	fn used_by(&mut self, derived: Weak<dyn Derived>) {
		self.used_by.insert(WeakAddr::new(derived));
	}

	fn not_used_by(&mut self, derived: &Weak<dyn Derived>) {
		self.used_by.remove(&WeakAddr::new(derived.clone()));
	}
}

impl<T> Observable for ComputedBody<T>
where
	T: 'static,
{
	fn update(&self) -> Result<Version, Error> {
		self.refresh()?;
		Ok(self.version.get())
	}

	fn version(&self) -> Version {
		self.version.get()
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		ComputedBody::used_by(self, derived)
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		ComputedBody::not_used_by(self, derived)
	}
}

impl<T> Access<T> for ComputedBody<T>
where
	T: 'static,
{
	fn get(&self, eval: &Evaluation) -> Result<crate::value::Ref<'_, T>, Error> {
		Ok(crate::value::Ref::Cell(self.get(eval)?))
	}

	fn get_once(&self) -> Result<crate::value::Ref<'_, T>, Error> {
		Ok(crate::value::Ref::Cell(self.get_once()?))
	}
}

impl<T> Derived for ComputedBody<T>
where
	T: 'static,
{
	fn invalidate(self: Rc<Self>, invalid: Invalid) {
		if self.state.get() != State::Valid {
			return;
		}

		self.state.set(State::Invalid(invalid));

		// Fan out over direct dependents only; anything further is
		// discovered lazily when those dependents are next read.
		let self_ref = self.inner.borrow();
		for item in &self_ref.used_by {
			if let Some(item) = item.upgrade() {
				item.invalidate(Invalid::Maybe);
			}
		}
	}
}

impl<T> From<Computed<T>> for Value<T>
where
	T: 'static,
{
	fn from(computed: Computed<T>) -> Self {
		Value::new(computed.body)
	}
}
