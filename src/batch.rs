use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::{Epoch, Error, Reactive};

type SchedulerHook = Rc<dyn Fn(Weak<dyn Reactive>)>;

thread_local! {
	static DEPTH: Cell<u32> = const { Cell::new(0) };
	static EPOCH: Cell<Epoch> = const { Cell::new(Epoch::FIRST) };
	static PENDING: RefCell<Vec<Weak<dyn Reactive>>> = const { RefCell::new(Vec::new()) };
	static SCHEDULER: RefCell<Option<SchedulerHook>> = const { RefCell::new(None) };
}

pub fn in_batch() -> bool {
	DEPTH.with(|depth| depth.get()) > 0
}

/// The current global epoch. Advances once per top-level write batch.
pub fn epoch() -> Epoch {
	EPOCH.with(|epoch| epoch.get())
}

pub(crate) fn advance_epoch() {
	EPOCH.with(|epoch| epoch.set(epoch.get().next()));
}

struct BatchGuard {
	root: bool,
}

impl BatchGuard {
	fn enter() -> Self {
		let root = DEPTH.with(|depth| {
			let prev = depth.get();
			depth.set(prev + 1);
			prev == 0
		});

		if root {
			advance_epoch();
		}

		BatchGuard { root }
	}
}

impl Drop for BatchGuard {
	fn drop(&mut self) {
		DEPTH.with(|depth| depth.set(depth.get() - 1));
	}
}

/// Group writes into one epoch. While the batch runs, dependent
/// computed values are only marked and dependent effects are only
/// queued; when the root batch exits and no external scheduler is
/// installed, the queue is dispatched.
pub fn batch<R>(func: impl FnOnce() -> R) -> Result<R, Error> {
	let guard = BatchGuard::enter();
	let out = func();
	let root = guard.root;
	drop(guard);

	if root && !scheduler_installed() {
		flush()?;
	}

	Ok(out)
}

fn scheduler_installed() -> bool {
	SCHEDULER.with(|hook| hook.borrow().is_some())
}

/// Install the external scheduler collaborator. Every newly scheduled
/// effect handle is handed to `hook`, and dispatching becomes the
/// host's job entirely: neither writes nor batches run effects once a
/// hook is installed.
pub fn set_scheduler(hook: impl Fn(Weak<dyn Reactive>) + 'static) {
	SCHEDULER.with(|slot| *slot.borrow_mut() = Some(Rc::new(hook)));
}

pub fn clear_scheduler() {
	SCHEDULER.with(|slot| *slot.borrow_mut() = None);
}

/// Queue `effect` for dispatch, or hand it to the external scheduler
/// when one is installed.
pub(crate) fn schedule(effect: Weak<dyn Reactive>) {
	let hook = SCHEDULER.with(|slot| slot.borrow().clone());

	match hook {
		Some(hook) => hook(effect),
		None => PENDING.with(|pending| pending.borrow_mut().push(effect)),
	}
}

/// Dispatch queued effects, one at a time, until the queue is dry.
/// An effect that fails aborts the flush with its error; the
/// remainder stays queued for the next flush.
pub fn flush() -> Result<(), Error> {
	loop {
		let next = PENDING.with(|pending| {
			let mut pending = pending.borrow_mut();
			if pending.is_empty() {
				None
			} else {
				Some(pending.remove(0))
			}
		});

		match next {
			Some(next) => {
				if let Some(reactive) = next.upgrade() {
					reactive.run()?;
				}
			}
			None => break,
		}
	}

	Ok(())
}
