use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use fxhash::FxHashSet;

use crate::addr::WeakAddr;
use crate::batch::{advance_epoch, in_batch};
use crate::evaluation::{writes_allowed, Evaluation};
use crate::value::{Access, Value};
use crate::{Computed, Derived, Error, Invalid, Observable, Version};

/// Decides whether a write actually changed a value. Must be pure,
/// side-effect-free and total; the graph trusts it blindly, so a
/// non-conforming function yields unspecified propagation behavior.
pub type EqualFn<T> = Box<dyn Fn(&T, &T) -> bool>;

/// A mutable producer cell. Reads register dependency edges, writes
/// bump the version and mark every live dependent.
pub struct Signal<T> {
	body: Rc<SignalBody<T>>,
}

impl<T: 'static> From<Signal<T>> for Rc<dyn Any> {
	fn from(signal: Signal<T>) -> Self {
		signal.body
	}
}

impl<T: 'static> TryFrom<Rc<dyn Any>> for Signal<T> {
	type Error = Rc<dyn Any>;
	fn try_from(value: Rc<dyn Any>) -> Result<Self, Self::Error> {
		Rc::downcast::<SignalBody<T>>(value).map(|body| Signal { body })
	}
}

pub struct SignalBody<T> {
	value: RefCell<T>,
	version: Cell<Version>,
	inner: RefCell<SignalInner<T>>,
}

struct SignalInner<T> {
	equal: EqualFn<T>,
	used_by: FxHashSet<WeakAddr<dyn Derived>>,
	this: Weak<SignalBody<T>>,
}

impl<T> Clone for Signal<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Default for Signal<T>
where
	T: Default + PartialEq + 'static,
{
	fn default() -> Self {
		Signal::new(Default::default())
	}
}

pub trait Toggle {
	fn toggle(&mut self);
}

impl Toggle for bool {
	fn toggle(&mut self) {
		*self = !*self
	}
}

impl<T> Signal<T>
where
	T: 'static,
{
	pub fn new(value: T) -> Self
	where
		T: PartialEq,
	{
		Signal::with_equal(value, Box::new(|a, b| a == b))
	}

	pub fn with_equal(value: T, equal: EqualFn<T>) -> Self {
		Signal {
			body: Rc::new_cyclic(|this| SignalBody {
				value: RefCell::new(value),
				version: Cell::new(Version::ZERO),
				inner: RefCell::new(SignalInner {
					equal,
					used_by: FxHashSet::default(),
					this: this.clone(),
				}),
			}),
		}
	}

	pub fn map<F, R>(&self, func: F) -> Computed<R>
	where
		F: Fn(&T) -> R + 'static,
		R: PartialEq + 'static,
	{
		let this = self.body.clone();
		Computed::new(Box::new(move |ev| {
			let value = this.get(ev);
			Ok(func(&*value))
		}))
	}

	#[inline]
	pub fn get(&self, eval: &impl AsRef<Evaluation>) -> Ref<'_, T> {
		self.body.get(eval.as_ref())
	}

	#[inline]
	pub fn get_once(&self) -> Ref<'_, T> {
		self.body.get_once()
	}

	#[inline]
	pub fn set(&self, value: T) -> Result<(), Error> {
		self.body.replace(value).map(|_| ())
	}

	#[inline]
	pub fn toggle(&self) -> Result<(), Error>
	where
		T: Toggle,
	{
		self.mutate(T::toggle)
	}

	/// Returns the displaced value: the prior one when the write
	/// lands, the incoming one when equality suppresses it.
	#[inline]
	pub fn replace(&self, value: T) -> Result<T, Error> {
		self.body.replace(value)
	}

	/// Read-then-set. The next value goes through the same equality
	/// check as `set`.
	#[inline]
	pub fn update(&self, func: impl FnOnce(&T) -> T) -> Result<(), Error> {
		let next = func(&self.body.get_once());
		self.set(next)
	}

	/// Mutate the value in place. The caller asserts a change
	/// occurred: the equality function is bypassed and dependents are
	/// always marked.
	#[inline]
	pub fn mutate(&self, func: impl FnOnce(&mut T)) -> Result<(), Error> {
		self.body.mutate(func)
	}

	/// A read-only view over this signal. Same underlying node, not a
	/// copy: writes through `self` stay visible to the view.
	pub fn read_only(&self) -> Value<T> {
		Value::new(self.body.clone())
	}
}

impl<T> SignalBody<T> {
	pub(crate) fn get_once(&self) -> Ref<'_, T> {
		self.value.borrow()
	}

	pub(crate) fn get<'a>(&'a self, eval: &'_ Evaluation) -> Ref<'a, T>
	where
		T: 'static,
	{
		let value = self.value.borrow();

		{
			let mut self_mut = self.inner.borrow_mut();
			eval.based_on(self_mut.this.upgrade().unwrap(), self.version.get());
			self_mut.used_by(eval.parent());
		}

		value
	}

	fn guard_write(&self) -> Result<(), Error> {
		if writes_allowed() {
			Ok(())
		} else {
			Err(Error::InvalidWrite)
		}
	}

	pub(crate) fn replace(&self, value: T) -> Result<T, Error>
	where
		T: 'static,
	{
		self.guard_write()?;

		let changed = !(self.inner.borrow().equal)(&self.value.borrow(), &value);
		if !changed {
			return Ok(value);
		}

		let old = std::mem::replace(&mut *self.value.borrow_mut(), value);
		self.propagate();

		Ok(old)
	}

	pub(crate) fn mutate(&self, func: impl FnOnce(&mut T)) -> Result<(), Error>
	where
		T: 'static,
	{
		self.guard_write()?;

		func(&mut self.value.borrow_mut());
		self.propagate();

		Ok(())
	}

	/// Bump the version, advance the epoch when this is a bare
	/// top-level write, and mark every live dependent invalid.
	/// Dependents are not recomputed here; they pull on their next
	/// read.
	fn propagate(&self)
	where
		T: 'static,
	{
		self.version.set(self.version.get().next());
		if !in_batch() {
			advance_epoch();
		}

		tracing::trace!(version = ?self.version.get(), "signal changed");

		let self_ref = self.inner.borrow();
		for item in &self_ref.used_by {
			if let Some(item) = item.upgrade() {
				item.invalidate(Invalid::Definitely)
			}
		}
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		self.inner.borrow_mut().used_by(derived);
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		self.inner.borrow_mut().not_used_by(derived);
	}
}

impl<T> SignalInner<T> {
	fn used_by(&mut self, derived: Weak<dyn Derived>) {
		self.used_by.insert(WeakAddr::new(derived));
	}

	fn not_used_by(&mut self, derived: &Weak<dyn Derived>) {
		self.used_by.remove(&WeakAddr::new(derived.clone()));
	}
}

impl<T: 'static> Observable for SignalBody<T> {
	fn update(&self) -> Result<Version, Error> {
		// A plain signal is always current.
		Ok(self.version.get())
	}

	fn version(&self) -> Version {
		self.version.get()
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		SignalBody::used_by(self, derived)
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		SignalBody::not_used_by(self, derived)
	}
}

impl<T> Access<T> for SignalBody<T>
where
	T: 'static,
{
	fn get(&self, eval: &Evaluation) -> Result<crate::value::Ref<'_, T>, Error> {
		Ok(crate::value::Ref::Cell(SignalBody::get(self, eval)))
	}

	fn get_once(&self) -> Result<crate::value::Ref<'_, T>, Error> {
		Ok(crate::value::Ref::Cell(SignalBody::get_once(self)))
	}
}

impl<T> From<Signal<T>> for Value<T>
where
	T: 'static,
{
	fn from(signal: Signal<T>) -> Self {
		Value::new(signal.body)
	}
}

impl<T> Debug for Signal<T>
where
	T: 'static + Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.get_once().fmt(f)
	}
}
