use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use mockall::predicate;

use ripple::{
	batch, clear_scheduler, epoch, flush, in_batch, set_scheduler, Computed, Const, Effect,
	Effects, Error, Reactive, Signal, Value,
};

mod mock;

use mock::Spy;

#[test]
fn computed() {
	let a = Signal::new(10u64);
	assert_eq!(*a.get_once(), 10);

	let b = Computed::new(Box::new({
		let a = a.clone();
		move |cx| Ok(*a.get(cx) + 10)
	}));

	assert_eq!(*b.get_once().unwrap(), 20);

	let mock = mock::SharedMock::new();

	mock.get().expect_trigger().times(1).return_const(());

	let _e = Effect::new(Box::new({
		let a = a.clone();
		let b = b.clone();
		let mock = mock.clone();
		move |cx| {
			mock.get().trigger(*a.get(cx) + *b.get(cx)?);
			Ok(())
		}
	}));

	flush().unwrap();

	mock.get().checkpoint();

	mock.get().expect_trigger().times(1).return_const(());

	batch(|| {
		a.set(20).unwrap();
		a.set(20).unwrap();
		a.set(20).unwrap();
	})
	.unwrap();

	assert_eq!(*b.get_once().unwrap(), 30);

	mock.get().checkpoint();
}

#[test]
fn equal_write_is_suppressed() {
	let a = Signal::new(1u64);

	let mock = mock::SharedMock::new();

	let _e = Effect::new(Box::new({
		let a = a.clone();
		let mock = mock.clone();
		move |cx| {
			mock.get().trigger(*a.get(cx));
			Ok(())
		}
	}));

	mock.get().expect_trigger().once().return_const(());

	flush().unwrap();

	mock.get().checkpoint();

	mock.get().expect_trigger().times(0).return_const(());

	batch(|| {
		a.set(1).unwrap();
	})
	.unwrap();

	mock.get().checkpoint();
}

#[test]
fn memoization() {
	let calls = Rc::new(Cell::new(0u32));
	let a = Signal::new(1u64);
	let b = Signal::new(2u64);

	let c = Computed::new(Box::new({
		let a = a.clone();
		let b = b.clone();
		let calls = calls.clone();
		move |cx| {
			calls.set(calls.get() + 1);
			Ok(*a.get(cx) + *b.get(cx))
		}
	}));

	assert_eq!(*c.get_once().unwrap(), 3);
	assert_eq!(*c.get_once().unwrap(), 3);
	assert_eq!(*c.get_once().unwrap(), 3);
	assert_eq!(calls.get(), 1);

	a.set(10).unwrap();

	assert_eq!(*c.get_once().unwrap(), 12);
	assert_eq!(*c.get_once().unwrap(), 12);
	assert_eq!(calls.get(), 2);
}

#[test]
fn stable_computed_suppresses_dependents() {
	let a = Signal::new(1u64);
	let parity = a.map(|value| value % 2);

	let mock = mock::SharedMock::new();

	mock.get().expect_trigger().times(1).return_const(());

	let _e = Effect::new(Box::new({
		let parity = parity.clone();
		let mock = mock.clone();
		move |cx| {
			mock.get().trigger(*parity.get(cx)?);
			Ok(())
		}
	}));

	flush().unwrap();
	mock.get().checkpoint();

	// 3 % 2 == 1 % 2: the computed recomputes internally, keeps its
	// version, and the effect stays idle.
	mock.get().expect_trigger().times(0).return_const(());

	batch(|| a.set(3).unwrap()).unwrap();

	mock.get().checkpoint();

	// 4 % 2 differs, so the effect reruns.
	mock.get().expect_trigger().times(1).return_const(());

	batch(|| a.set(4).unwrap()).unwrap();

	mock.get().checkpoint();
}

#[test]
fn glitch_free_reads() {
	let first = Signal::new("Jane".to_string());
	let last = Signal::new("Doe".to_string());

	let full = Computed::new(Box::new({
		let first = first.clone();
		let last = last.clone();
		move |cx| Ok(format!("{} {}", *first.get(cx), *last.get(cx)))
	}));

	assert_eq!(*full.get_once().unwrap(), "Jane Doe");

	batch(|| {
		first.set("John".into()).unwrap();
		last.set("Smith".into()).unwrap();
	})
	.unwrap();

	assert_eq!(*full.get_once().unwrap(), "John Smith");
}

#[test]
fn glitch_free_effect_observes_writes_atomically() {
	let a = Signal::new(1u64);
	let b = Signal::new(10u64);

	let sum = Computed::new(Box::new({
		let a = a.clone();
		let b = b.clone();
		move |cx| Ok(*a.get(cx) + *b.get(cx))
	}));

	let mock = mock::SharedMock::new();

	mock.get()
		.expect_trigger()
		.with(predicate::eq(11u64))
		.times(1)
		.return_const(());

	let _e = Effect::new(Box::new({
		let sum = sum.clone();
		let mock = mock.clone();
		move |cx| {
			mock.get().trigger(*sum.get(cx)?);
			Ok(())
		}
	}));

	flush().unwrap();
	mock.get().checkpoint();

	// Never 12 or 21: the effect only runs after the whole batch.
	mock.get()
		.expect_trigger()
		.with(predicate::eq(22u64))
		.times(1)
		.return_const(());

	batch(|| {
		a.set(2).unwrap();
		b.set(20).unwrap();
	})
	.unwrap();

	mock.get().checkpoint();
}

#[test]
fn diamond_stays_consistent() {
	let a = Signal::new(2u64);

	let double = a.map(|value| value * 2);
	let inc = a.map(|value| value + 1);

	let sum = Computed::new(Box::new({
		let double = double.clone();
		let inc = inc.clone();
		move |cx| Ok(*double.get(cx)? + *inc.get(cx)?)
	}));

	assert_eq!(*sum.get_once().unwrap(), 7);

	a.set(5).unwrap();

	assert_eq!(*sum.get_once().unwrap(), 16);
}

#[test]
fn cycle_detection() {
	let slot: Rc<RefCell<Option<Computed<u64>>>> = Rc::new(RefCell::new(None));

	let c1 = Computed::new(Box::new({
		let slot = slot.clone();
		move |cx| {
			let c2 = slot.borrow().clone().unwrap();
			let v = *c2.get(cx)? + 1;
			Ok(v)
		}
	}));

	let c2 = Computed::new(Box::new({
		let c1 = c1.clone();
		move |cx| Ok(*c1.get(cx)? + 1)
	}));

	*slot.borrow_mut() = Some(c2);

	assert!(matches!(c1.get_once(), Err(Error::Cycle { .. })));

	// An errored node retries on the next read, and the cycle is
	// still there.
	assert!(matches!(c1.get_once(), Err(Error::Cycle { .. })));
}

#[test]
fn self_cycle_detection() {
	let slot: Rc<RefCell<Option<Computed<u64>>>> = Rc::new(RefCell::new(None));

	let c = Computed::new(Box::new({
		let slot = slot.clone();
		move |cx| {
			let this = slot.borrow().clone().unwrap();
			let v = *this.get(cx)? + 1;
			Ok(v)
		}
	}));

	*slot.borrow_mut() = Some(c.clone());

	assert!(matches!(c.get_once(), Err(Error::Cycle { .. })));
}

#[test]
fn write_inside_computed_fails() {
	let a = Signal::new(1u64);
	let b = Signal::new(2u64);

	let c = Computed::new(Box::new({
		let a = a.clone();
		let b = b.clone();
		move |cx| {
			b.set(*a.get(cx) + 1)?;
			Ok(*a.get(cx))
		}
	}));

	assert!(matches!(c.get_once(), Err(Error::InvalidWrite)));

	// The write never landed.
	assert_eq!(*b.get_once(), 2);
}

#[test]
fn effect_write_requires_opt_in() {
	let source = Signal::new(1u64);
	let mirror = Signal::new(0u64);

	let _e = Effect::new(Box::new({
		let source = source.clone();
		let mirror = mirror.clone();
		move |cx| {
			mirror.set(*source.get(cx))?;
			Ok(())
		}
	}));

	assert!(matches!(flush(), Err(Error::InvalidWrite)));
	assert_eq!(*mirror.get_once(), 0);
}

#[test]
fn effect_write_opt_in() {
	let source = Signal::new(1u64);
	let mirror = Signal::new(0u64);

	let _e = Effect::new(Box::new({
		let source = source.clone();
		let mirror = mirror.clone();
		move |cx| {
			mirror.set(*source.get(cx))?;
			Ok(())
		}
	}))
	.allow_writes();

	flush().unwrap();
	assert_eq!(*mirror.get_once(), 1);

	batch(|| source.set(5).unwrap()).unwrap();
	assert_eq!(*mirror.get_once(), 5);
}

#[test]
fn feedback_write_reschedules() {
	let a = Signal::new(0u64);
	let runs = Rc::new(Cell::new(0u32));

	let _e = Effect::new(Box::new({
		let a = a.clone();
		let runs = runs.clone();
		move |cx| {
			runs.set(runs.get() + 1);
			let value = *a.get(cx);
			if value < 3 {
				a.set(value + 1)?;
			}
			Ok(())
		}
	}))
	.allow_writes();

	flush().unwrap();

	assert_eq!(*a.get_once(), 3);
	assert_eq!(runs.get(), 4);
}

#[test]
fn errored_computation_retries() {
	#[derive(Debug)]
	struct Flaky;

	impl std::fmt::Display for Flaky {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "flaky failure")
		}
	}

	impl std::error::Error for Flaky {}

	let a = Signal::new(1u64);
	let fail = Rc::new(Cell::new(true));

	let c = Computed::new(Box::new({
		let a = a.clone();
		let fail = fail.clone();
		move |cx| {
			let value = *a.get(cx);
			if fail.get() {
				return Err(Error::computation(Flaky));
			}
			Ok(value * 10)
		}
	}));

	assert!(matches!(c.get_once(), Err(Error::Computation(_))));

	// The failure never updated the cache, so the next read starts
	// over.
	fail.set(false);
	assert_eq!(*c.get_once().unwrap(), 10);
}

#[test]
fn disposal_is_idempotent_and_terminal() {
	let a = Signal::new(1u64);

	let mock = mock::SharedMock::new();

	mock.get().expect_trigger().times(1).return_const(());

	let e = Effect::new(Box::new({
		let a = a.clone();
		let mock = mock.clone();
		move |cx| {
			mock.get().trigger(*a.get(cx));
			Ok(())
		}
	}));

	flush().unwrap();
	mock.get().checkpoint();

	e.dispose();
	e.dispose();

	mock.get().expect_trigger().times(0).return_const(());

	batch(|| a.set(2).unwrap()).unwrap();
	e.run().unwrap();

	mock.get().checkpoint();
}

#[test]
fn dispose_cancels_pending_run() {
	let a = Signal::new(1u64);
	let runs = Rc::new(Cell::new(0u32));

	let e = Effect::new(Box::new({
		let a = a.clone();
		let runs = runs.clone();
		move |cx| {
			runs.set(runs.get() + 1);
			let _ = *a.get(cx);
			Ok(())
		}
	}));

	flush().unwrap();
	assert_eq!(runs.get(), 1);

	// After the write returns the effect is scheduled, not re-run.
	a.set(2).unwrap();
	assert_eq!(runs.get(), 1);

	e.dispose();
	flush().unwrap();
	assert_eq!(runs.get(), 1);
}

#[test]
fn effects_coalesce_across_a_batch() {
	let a = Signal::new(1u64);
	let b = Signal::new(2u64);
	let runs = Rc::new(Cell::new(0u32));

	let _e = Effect::new(Box::new({
		let a = a.clone();
		let b = b.clone();
		let runs = runs.clone();
		move |cx| {
			runs.set(runs.get() + 1);
			let _ = *a.get(cx) + *b.get(cx);
			Ok(())
		}
	}));

	flush().unwrap();
	assert_eq!(runs.get(), 1);

	batch(|| {
		a.set(10).unwrap();
		b.set(20).unwrap();
		a.set(30).unwrap();
	})
	.unwrap();

	assert_eq!(runs.get(), 2);
}

#[test]
fn custom_equality() {
	let a = Signal::with_equal(
		1.0f64,
		Box::new(|prev: &f64, next: &f64| (*prev - *next).abs() < 0.5),
	);

	// Within tolerance: the write is suppressed entirely, the cell
	// keeps its old value and nothing propagates.
	a.set(1.2).unwrap();
	assert_eq!(*a.get_once(), 1.0);

	a.set(2.0).unwrap();
	assert_eq!(*a.get_once(), 2.0);
}

#[test]
fn mutate_always_propagates() {
	let a = Signal::new(5u64);
	let runs = Rc::new(Cell::new(0u32));

	let _e = Effect::new(Box::new({
		let a = a.clone();
		let runs = runs.clone();
		move |cx| {
			runs.set(runs.get() + 1);
			let _ = *a.get(cx);
			Ok(())
		}
	}));

	flush().unwrap();
	assert_eq!(runs.get(), 1);

	// The value is untouched, but mutate asserts a change occurred.
	batch(|| a.mutate(|_| {}).unwrap()).unwrap();
	assert_eq!(runs.get(), 2);
}

#[test]
fn update_replace_and_toggle() {
	let list = Signal::new(vec![1, 2]);

	list.update(|values| {
		let mut next = values.clone();
		next.push(3);
		next
	})
	.unwrap();
	assert_eq!(*list.get_once(), vec![1, 2, 3]);

	list.mutate(|values| values.push(4)).unwrap();
	assert_eq!(*list.get_once(), vec![1, 2, 3, 4]);

	let old = list.replace(vec![]).unwrap();
	assert_eq!(old, vec![1, 2, 3, 4]);
	assert!(list.get_once().is_empty());

	let flag = Signal::new(false);
	flag.toggle().unwrap();
	assert!(*flag.get_once());
}

#[test]
fn read_only_view_shares_identity() {
	let a = Signal::new(1u64);
	let view = a.read_only();

	assert_eq!(*view.get_once().unwrap(), 1);

	a.set(2).unwrap();
	assert_eq!(*view.get_once().unwrap(), 2);
}

#[test]
fn value_wraps_signals_and_computeds() {
	let a = Signal::new(2u64);
	let double = a.map(|value| value * 2);

	let values: Vec<Value<u64>> = vec![a.clone().into(), double.into()];

	assert_eq!(*values[0].get_once().unwrap(), 2);
	assert_eq!(*values[1].get_once().unwrap(), 4);

	a.set(3).unwrap();
	assert_eq!(*values[1].get_once().unwrap(), 6);
}

#[test]
fn const_producer() {
	let base: Value<u64> = Const::new(100u64).into();
	let a = Signal::new(1u64);

	let c = Computed::new(Box::new({
		let base = base.clone();
		let a = a.clone();
		move |cx| Ok(*base.get(cx)? + *a.get(cx))
	}));

	assert_eq!(*c.get_once().unwrap(), 101);

	a.set(5).unwrap();
	assert_eq!(*c.get_once().unwrap(), 105);
}

#[test]
fn effects_bundle() {
	let a = Signal::new(1u64);

	let mock = mock::SharedMock::new();

	mock.get().expect_trigger().times(2).return_const(());

	let mut effects: Effects<2> = Effects::default();

	for _ in 0..2 {
		effects.add(Effect::new(Box::new({
			let a = a.clone();
			let mock = mock.clone();
			move |cx| {
				mock.get().trigger(*a.get(cx));
				Ok(())
			}
		})));
	}

	flush().unwrap();
	mock.get().checkpoint();

	effects.dispose();

	mock.get().expect_trigger().times(0).return_const(());

	batch(|| a.set(2).unwrap()).unwrap();

	mock.get().checkpoint();
}

#[test]
fn epoch_advances_once_per_batch() {
	let a = Signal::new(1u64);

	let before = epoch();

	batch(|| {
		assert!(in_batch());
		let inside = epoch();
		a.set(2).unwrap();
		a.set(3).unwrap();
		batch(|| assert_eq!(epoch(), inside)).unwrap();
	})
	.unwrap();

	assert!(!in_batch());
	assert!(epoch() > before);

	// Each bare top-level write is its own batch.
	let between = epoch();
	a.set(4).unwrap();
	assert!(epoch() > between);
}

#[test]
fn scheduler_hook_owns_dispatch() {
	let scheduled: Rc<RefCell<Vec<Weak<dyn Reactive>>>> = Rc::new(RefCell::new(Vec::new()));

	set_scheduler({
		let scheduled = scheduled.clone();
		move |effect| scheduled.borrow_mut().push(effect)
	});

	let a = Signal::new(1u64);
	let runs = Rc::new(Cell::new(0u32));

	let _e = Effect::new(Box::new({
		let a = a.clone();
		let runs = runs.clone();
		move |cx| {
			runs.set(runs.get() + 1);
			let _ = *a.get(cx);
			Ok(())
		}
	}));

	// Creation handed the effect to the hook; nothing ran yet.
	assert_eq!(scheduled.borrow().len(), 1);
	assert_eq!(runs.get(), 0);

	let pending: Vec<_> = scheduled.borrow_mut().drain(..).collect();
	for weak in pending {
		if let Some(reactive) = weak.upgrade() {
			reactive.run().unwrap();
		}
	}
	assert_eq!(runs.get(), 1);

	// With a scheduler installed the root batch does not dispatch.
	batch(|| a.set(2).unwrap()).unwrap();
	assert_eq!(scheduled.borrow().len(), 1);
	assert_eq!(runs.get(), 1);

	clear_scheduler();
}

#[test]
fn macros_build_computeds_and_effects() {
	let a = Signal::new(2u64);

	let c = ripple::computed! { (a) cx => Ok(*a.get(cx) * 10) };
	assert_eq!(*c.get_once().unwrap(), 20);

	let runs = Rc::new(Cell::new(0u32));

	let _e = ripple::effect! { (c, runs) cx => {
		runs.set(runs.get() + 1);
		let _ = *c.get(cx)?;
		Ok(())
	}};

	flush().unwrap();
	assert_eq!(runs.get(), 1);

	ripple::batch!(a.set(3).unwrap()).unwrap();

	assert_eq!(runs.get(), 2);
	assert_eq!(*c.get_once().unwrap(), 30);
}
