use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::dependencies::Dependencies;
use crate::{Derived, Observable, Version};

/// Tracking context for a single consumer computation. Every read
/// performed through it records an edge, so the consumer's dependency
/// set always mirrors what the last computation actually touched.
pub struct Evaluation {
	inner: RefCell<EvaluationInner>,
	parent: Weak<dyn Derived>,
}

impl AsRef<Evaluation> for Evaluation {
	fn as_ref(&self) -> &Evaluation {
		self
	}
}

struct EvaluationInner {
	dependencies: Dependencies,
}

impl Evaluation {
	pub(crate) fn new(parent: Weak<dyn Derived>) -> Self {
		Evaluation {
			parent,
			inner: RefCell::new({
				EvaluationInner {
					dependencies: Dependencies::new(),
				}
			}),
		}
	}

	pub(crate) fn parent(&self) -> Weak<dyn Derived> {
		self.parent.clone()
	}

	pub(crate) fn based_on(&self, observable: Rc<dyn Observable>, version: Version) {
		self.inner
			.borrow_mut()
			.dependencies
			.based_on(observable, version);
	}

	pub(crate) fn take(self) -> Dependencies {
		self.inner.into_inner().dependencies
	}
}

thread_local! {
	static WRITES_ALLOWED: Cell<bool> = const { Cell::new(true) };
}

pub(crate) fn writes_allowed() -> bool {
	WRITES_ALLOWED.with(|allowed| allowed.get())
}

/// Write permission for the duration of one computation. The previous
/// permission is restored on drop, unwind included, so a failing
/// computation never leaks its restriction to the caller.
pub(crate) struct WriteScope {
	prev: bool,
}

impl WriteScope {
	pub(crate) fn new(allowed: bool) -> Self {
		let prev = WRITES_ALLOWED.with(|cell| cell.replace(allowed));
		WriteScope { prev }
	}
}

impl Drop for WriteScope {
	fn drop(&mut self) {
		WRITES_ALLOWED.with(|cell| cell.set(self.prev));
	}
}
