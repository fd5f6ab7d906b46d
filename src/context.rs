use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use crate::Error;

/// The narrow interface an external lookup function consumes. This
/// module stores and exposes resolvers; it never interprets tokens
/// itself.
pub trait Resolver: 'static {
	fn resolve(&self, token: TypeId) -> Option<Rc<dyn Any>>;
}

/// A stand-in for the privileged lookup, installed for the duration
/// of a scope. Takes precedence over the resolver slot.
pub type InjectFn = Rc<dyn Fn(TypeId) -> Option<Rc<dyn Any>>>;

thread_local! {
	static RESOLVER: RefCell<Option<Rc<dyn Resolver>>> = const { RefCell::new(None) };
	static OVERRIDE: RefCell<Option<InjectFn>> = const { RefCell::new(None) };
}

/// The currently installed resolver, if any.
pub fn current_resolver() -> Option<Rc<dyn Resolver>> {
	RESOLVER.with(|slot| slot.borrow().clone())
}

/// The currently installed inject override, if any.
pub fn inject_override() -> Option<InjectFn> {
	OVERRIDE.with(|slot| slot.borrow().clone())
}

/// Precondition guard for the privileged lookup: fails unless a
/// resolver or an inject override is installed right now. `called`
/// names the offending call in the error.
pub fn assert_in_context(called: &'static str) -> Result<(), Error> {
	let present =
		RESOLVER.with(|slot| slot.borrow().is_some()) || OVERRIDE.with(|slot| slot.borrow().is_some());

	if present {
		Ok(())
	} else {
		Err(Error::MissingContext { called })
	}
}

// Scoped acquisition for both slots. Restores on drop, so a panic in
// user code cannot leak a context across the call boundary.
struct ContextGuard {
	resolver: Option<Rc<dyn Resolver>>,
	inject: Option<InjectFn>,
}

impl ContextGuard {
	fn install(resolver: Option<Rc<dyn Resolver>>, inject: Option<InjectFn>) -> Self {
		ContextGuard {
			resolver: RESOLVER.with(|slot| slot.replace(resolver)),
			inject: OVERRIDE.with(|slot| slot.replace(inject)),
		}
	}
}

impl Drop for ContextGuard {
	fn drop(&mut self) {
		RESOLVER.with(|slot| *slot.borrow_mut() = self.resolver.take());
		OVERRIDE.with(|slot| *slot.borrow_mut() = self.inject.take());
	}
}

/// Run `func` with `resolver` installed as the current resolution
/// context. The previous resolver and inject override are restored on
/// every exit path, a panic inside `func` included. The override slot
/// is cleared for the duration: a freshly installed resolver is never
/// shadowed by an older override.
pub fn run_in_context<R>(resolver: Rc<dyn Resolver>, func: impl FnOnce() -> R) -> R {
	let _guard = ContextGuard::install(Some(resolver), None);
	func()
}

/// Run `func` with `inject` standing in for the privileged lookup.
/// The resolver slot is left as-is; restore discipline matches
/// [`run_in_context`].
pub fn with_inject_override<R>(inject: InjectFn, func: impl FnOnce() -> R) -> R {
	let resolver = current_resolver();
	let _guard = ContextGuard::install(resolver, Some(inject));
	func()
}
