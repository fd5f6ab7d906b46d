use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::addr::RcAddr;
use crate::{Derived, Error, Observable, Version};

/// The producers a consumer read during its last computation, with
/// the version each one had at the time of the read.
#[derive(Default)]
pub struct Dependencies {
	based_on: BTreeMap<RcAddr<dyn Observable>, Version>,
}

impl Dependencies {
	pub fn new() -> Self {
		Self {
			based_on: BTreeMap::new(),
		}
	}

	/// Detach `parent` from every recorded producer. Used on disposal
	/// and drop.
	pub(crate) fn drop_edges(&mut self, parent: &Weak<dyn Derived>) {
		for item in self.based_on.keys() {
			item.not_used_by(parent);
		}
		self.based_on.clear();
	}

	pub(crate) fn based_on(&mut self, observable: Rc<dyn Observable>, version: Version) {
		self.based_on.insert(RcAddr::new(observable), version);
	}

	/// Re-verify every recorded version. Each producer brings itself
	/// up to date first, so a computed dependency that stabilized on
	/// an equal value still counts as unchanged here.
	pub(crate) fn are_valid(&self) -> Result<bool, Error> {
		for (base, version) in self.based_on.iter() {
			if base.update()? != *version {
				return Ok(false);
			}
		}

		Ok(true)
	}

	/// Install the edge set a fresh computation recorded and detach
	/// `parent` from producers it no longer reads.
	pub(crate) fn swap(&mut self, next: Dependencies, parent: &Weak<dyn Derived>) {
		let prev = std::mem::replace(&mut self.based_on, next.based_on);

		// Diff the keys
		prev.keys()
			.filter(|k| !self.based_on.contains_key(k))
			.for_each(|k| k.not_used_by(parent));
	}
}
