use std::rc::{Rc, Weak};

use crate::value::{Access, Value};
use crate::{Error, Evaluation, Observable, Version};

/// A producer whose value never changes. Stays at version zero
/// forever and registers no edges, so consumers reading it never
/// recompute because of it.
pub struct Const<T> {
	body: Rc<ConstBody<T>>,
}

struct ConstBody<T> {
	value: T,
}

impl<T> Clone for Const<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Const<T>
where
	T: 'static,
{
	pub fn new(value: T) -> Self {
		Const {
			body: Rc::new(ConstBody { value }),
		}
	}

	pub fn get(&self) -> &T {
		&self.body.value
	}

	pub fn read_only(&self) -> Value<T> {
		Value::new(self.body.clone())
	}
}

impl<T> Observable for ConstBody<T>
where
	T: 'static,
{
	fn update(&self) -> Result<Version, Error> {
		Ok(self.version())
	}

	fn version(&self) -> Version {
		Version::ZERO
	}

	fn used_by(&self, _: Weak<dyn crate::Derived>) {}
	fn not_used_by(&self, _: &Weak<dyn crate::Derived>) {}
}

impl<T> Access<T> for ConstBody<T>
where
	T: 'static,
{
	fn get(&self, _: &Evaluation) -> Result<crate::value::Ref<'_, T>, Error> {
		Ok(crate::value::Ref::Ref(&self.value))
	}

	fn get_once(&self) -> Result<crate::value::Ref<'_, T>, Error> {
		Ok(crate::value::Ref::Ref(&self.value))
	}
}

impl<T> From<Const<T>> for Value<T>
where
	T: 'static,
{
	fn from(value: Const<T>) -> Self {
		Value::new(value.body)
	}
}
