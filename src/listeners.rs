use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use smallvec::SmallVec;

use crate::error::{BoxError, ListenerError};
use crate::{Property, PropertyId};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ListenerId(u64);

/// One notification: the property whose value changed.
#[derive(Clone, Copy, Debug)]
pub struct Change<'a> {
	id: PropertyId,
	name: &'a str,
}

impl<'a> Change<'a> {
	pub(crate) fn new(id: PropertyId, name: &'a str) -> Self {
		Change { id, name }
	}

	pub fn id(&self) -> PropertyId {
		self.id
	}

	pub fn name(&self) -> &'a str {
		self.name
	}

	/// Whether this change is about `property`.
	pub fn is(&self, property: &impl Property) -> bool {
		self.id == property.id()
	}
}

pub(crate) type Snapshot<L> = SmallVec<[(ListenerId, L); 4]>;

/// Subscribers of one object, in subscription order. `L` is the shared
/// pointer the front-end stores listeners behind (`Rc` or `Arc`), so taking
/// a snapshot only bumps reference counts.
pub(crate) struct ListenerRegistry<L> {
	next: u64,
	entries: Snapshot<L>,
}

impl<L> Default for ListenerRegistry<L> {
	fn default() -> Self {
		ListenerRegistry {
			next: 0,
			entries: SmallVec::new(),
		}
	}
}

impl<L: Clone> ListenerRegistry<L> {
	pub fn add(&mut self, listener: L) -> ListenerId {
		let id = ListenerId(self.next);
		self.next += 1;
		self.entries.push((id, listener));
		id
	}

	/// Returns whether the listener was still registered.
	pub fn remove(&mut self, id: ListenerId) -> bool {
		let len = self.entries.len();
		self.entries.retain(|(entry, _)| *entry != id);
		self.entries.len() != len
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// The listeners to call for one notification. Changes to the registry
	/// made while they run only affect later notifications.
	pub fn snapshot(&self) -> Snapshot<L> {
		self.entries.clone()
	}
}

/// Runs one listener, turning a panic or an `Err` into a [`ListenerError`].
pub(crate) fn invoke(
	change: &Change<'_>,
	listener: impl FnOnce() -> Result<(), BoxError>,
) -> Result<(), ListenerError> {
	match panic::catch_unwind(AssertUnwindSafe(listener)) {
		Ok(Ok(())) => Ok(()),
		Ok(Err(source)) => Err(ListenerError::Failed {
			property: change.name().to_string(),
			source,
		}),
		Err(payload) => Err(ListenerError::Panicked {
			property: change.name().to_string(),
			message: panic_message(payload.as_ref()),
		}),
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&'static str>() {
		message.to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"<non-string panic payload>".to_string()
	}
}

/// Fallback for objects without an error hook.
pub(crate) fn log_listener_error(error: &ListenerError) {
	tracing::error!(property = error.property(), %error, "listener failed");
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn snapshot_is_detached_from_registry() {
		let mut registry = ListenerRegistry::default();
		let first = registry.add("first");
		registry.add("second");

		let snapshot = registry.snapshot();
		assert!(registry.remove(first));
		assert!(!registry.remove(first));

		assert_eq!(snapshot.len(), 2);
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn invoke_isolates_panics_and_errors() {
		let change = Change::new(PropertyId(0), "Age");

		let err = invoke(&change, || panic!("boom")).unwrap_err();
		assert!(matches!(&err, ListenerError::Panicked { message, .. } if message == "boom"));

		let err = invoke(&change, || Err("nope".into())).unwrap_err();
		assert_eq!(err.property(), "Age");
		assert!(matches!(err, ListenerError::Failed { .. }));

		assert!(invoke(&change, || Ok(())).is_ok());
	}
}
