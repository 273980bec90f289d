use std::cell::RefCell;
use std::ops::Deref;

use smallvec::SmallVec;

use crate::schema::{Schema, UndeclaredReads};
use crate::store::PropertyStore;
use crate::{Property, PropertyId};

/// Read access to an object's properties while a compute function runs.
///
/// Every read is recorded so that reads of properties missing from the
/// computed property's declared dependencies can be reported.
pub struct Evaluation<'a> {
	schema: &'a Schema,
	store: &'a PropertyStore,
	parent: Option<PropertyId>,
	reads: RefCell<SmallVec<[PropertyId; 8]>>,
}

impl<'a> AsRef<Evaluation<'a>> for Evaluation<'a> {
	fn as_ref(&self) -> &Evaluation<'a> {
		self
	}
}

impl<'a> Evaluation<'a> {
	pub(crate) fn new(
		schema: &'a Schema,
		store: &'a PropertyStore,
		parent: Option<PropertyId>,
	) -> Self {
		Evaluation {
			schema,
			store,
			parent,
			reads: RefCell::new(SmallVec::new()),
		}
	}

	/// Reads a property. Base values are borrowed from the store, computed
	/// values are produced by running their compute function again.
	#[track_caller]
	pub fn get<P: Property>(&self, property: &P) -> Ref<'a, P::Value> {
		self.schema.check(property);
		let id = property.id();
		if self.parent.is_some() {
			self.reads.borrow_mut().push(id);
		}

		if self.schema.is_computed(id) {
			Ref::Owned(self.schema.evaluate(id, self.store).downcast::<P::Value>())
		} else {
			Ref::Ref(self.store.base(id).downcast_ref::<P::Value>())
		}
	}

	/// The computed property being evaluated, if any.
	pub fn parent(&self) -> Option<PropertyId> {
		self.parent
	}

	pub(crate) fn finish(self, policy: UndeclaredReads) {
		let Some(parent) = self.parent else {
			return;
		};

		if policy == UndeclaredReads::Ignore {
			return;
		}

		let schema = self.schema;
		let declared = schema.dependencies(parent);
		let mut reads = self.reads.into_inner();
		reads.sort_unstable();
		reads.dedup();

		for read in reads {
			if declared.contains(&read) {
				continue;
			}

			let property = schema.name_of(parent);
			let undeclared = schema.name_of(read);
			match policy {
				UndeclaredReads::Panic => panic!(
					"`{property}` read `{undeclared}` without declaring it as a dependency"
				),
				_ => tracing::warn!(
					property,
					undeclared,
					"computed property read a property it does not depend on"
				),
			}
		}
	}
}

/// A value read during an [`Evaluation`].
pub enum Ref<'a, T> {
	Ref(&'a T),
	Owned(T),
}

impl<'a, T> Ref<'a, T>
where
	T: Clone,
{
	pub fn into_owned(self) -> T {
		match self {
			Ref::Ref(value) => value.clone(),
			Ref::Owned(value) => value,
		}
	}
}

impl<'a, T> Deref for Ref<'a, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		match self {
			Ref::Ref(value) => value,
			Ref::Owned(value) => value,
		}
	}
}
