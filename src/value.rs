use std::ops::Deref;
use std::rc::Rc;

use crate::{Error, Evaluation, Observable};

/// A capability-restricted, read-only view over any producer. It
/// shares the underlying node with the signal or computed it came
/// from, so writes through the original handle stay visible here.
pub struct Value<T> {
	value: Rc<dyn Access<T>>,
}

impl<T> Clone for Value<T> {
	fn clone(&self) -> Self {
		Value {
			value: self.value.clone(),
		}
	}
}

impl<T> Value<T>
where
	T: 'static,
{
	pub fn new(value: Rc<dyn Access<T>>) -> Self {
		Value { value }
	}

	pub fn get(&self, eval: &impl AsRef<Evaluation>) -> Result<Ref<'_, T>, Error> {
		self.value.get(eval.as_ref())
	}

	pub fn get_once(&self) -> Result<Ref<'_, T>, Error> {
		self.value.get_once()
	}
}

pub enum Ref<'a, T> {
	Ref(&'a T),
	Cell(std::cell::Ref<'a, T>),
}

impl<'a, T> Deref for Ref<'a, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		match self {
			Ref::Cell(guard) => guard.deref(),
			Ref::Ref(t) => t,
		}
	}
}

pub trait Access<T>: Observable {
	fn get(&self, eval: &Evaluation) -> Result<Ref<'_, T>, Error>;
	fn get_once(&self) -> Result<Ref<'_, T>, Error>;
}
