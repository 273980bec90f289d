use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread;

use crate::cascade::{self, Announcements};
use crate::error::{BoxError, ListenerError, LookupError};
use crate::evaluation::Evaluation;
use crate::listeners::{self, Change, ListenerId, ListenerRegistry};
use crate::store::PropertyStore;
use crate::value::{PropertyValue, Value};
use crate::{Property, PropertyId, Schema, Var};

type Listener = dyn Fn(&Change<'_>) -> Result<(), BoxError>;
type ErrorHook = dyn Fn(&ListenerError);

/// An instance of a [`Schema`]. Clones share the same state.
#[derive(Clone)]
pub struct Object {
	body: Rc<ObjectBody>,
}

/// A non-owning reference to an [`Object`], for listeners that need to reach
/// back into the object they observe.
#[derive(Clone)]
pub struct WeakObject {
	body: Weak<ObjectBody>,
}

struct ObjectBody {
	schema: Arc<Schema>,
	store: RefCell<PropertyStore>,
	listeners: RefCell<ListenerRegistry<Rc<Listener>>>,
	on_error: RefCell<Option<Rc<ErrorHook>>>,
	pending: RefCell<VecDeque<PropertyId>>,
	dispatching: Cell<bool>,
}

impl Object {
	pub fn new(schema: Arc<Schema>) -> Self {
		let store = PropertyStore::new(&schema);
		Object {
			body: Rc::new(ObjectBody {
				schema,
				store: RefCell::new(store),
				listeners: RefCell::new(ListenerRegistry::default()),
				on_error: RefCell::new(None),
				pending: RefCell::new(VecDeque::new()),
				dispatching: Cell::new(false),
			}),
		}
	}

	pub fn schema(&self) -> &Arc<Schema> {
		&self.body.schema
	}

	pub fn downgrade(&self) -> WeakObject {
		WeakObject {
			body: Rc::downgrade(&self.body),
		}
	}

	/// Reads a property. Computed properties are evaluated on every call.
	#[track_caller]
	pub fn get<P: Property>(&self, property: &P) -> P::Value {
		let store = self.body.store.borrow();
		let value = Evaluation::new(&self.body.schema, &store, None)
			.get(property)
			.into_owned();
		value
	}

	/// Writes a base property and notifies listeners about it and about every
	/// computed property whose value changed as a result. Writing the current
	/// value does nothing. Returns whether the value changed.
	#[track_caller]
	pub fn set<T: PropertyValue>(&self, var: &Var<T>, value: T) -> bool {
		self.body.schema.check(var);
		let announcements = {
			let mut store = self.body.store.borrow_mut();
			if !store.write(var.id(), Value::new(value)) {
				return false;
			}
			cascade::announce(&self.body.schema, &mut store, var.id())
		};

		self.body.dispatch(announcements);
		true
	}

	/// Like [`set`](Object::set), returning the previous value.
	#[track_caller]
	pub fn replace<T: PropertyValue>(&self, var: &Var<T>, value: T) -> T {
		self.body.schema.check(var);
		let (old, announcements) = {
			let mut store = self.body.store.borrow_mut();
			let (old, changed) = store.replace(var.id(), value);
			if !changed {
				return old;
			}
			(old, cascade::announce(&self.body.schema, &mut store, var.id()))
		};

		self.body.dispatch(announcements);
		old
	}

	/// Mutates a base property in place. Listeners are notified only if the
	/// value differs afterwards.
	#[track_caller]
	pub fn update<T: PropertyValue>(&self, var: &Var<T>, func: impl FnOnce(&mut T)) -> bool {
		self.body.schema.check(var);
		let announcements = {
			let mut store = self.body.store.borrow_mut();
			if !store.update(var.id(), func) {
				return false;
			}
			cascade::announce(&self.body.schema, &mut store, var.id())
		};

		self.body.dispatch(announcements);
		true
	}

	pub fn get_named<T: PropertyValue>(&self, name: &str) -> Result<T, LookupError> {
		let schema = &self.body.schema;
		if schema.is_computed(schema.lookup::<T>(name)?) {
			Ok(self.get(&schema.computed::<T>(name)?))
		} else {
			Ok(self.get(&schema.var::<T>(name)?))
		}
	}

	pub fn set_named<T: PropertyValue>(&self, name: &str, value: T) -> Result<bool, LookupError> {
		let var = self.body.schema.var::<T>(name)?;
		Ok(self.set(&var, value))
	}

	/// Registers `listener` for every change of this object. The listener
	/// stays registered until the returned [`Subscription`] is dropped or
	/// unsubscribed.
	#[must_use = "dropping the subscription unsubscribes the listener"]
	pub fn subscribe(&self, listener: impl Fn(&Change<'_>) + 'static) -> Subscription {
		self.try_subscribe(move |change| {
			listener(change);
			Ok(())
		})
	}

	/// Like [`subscribe`](Object::subscribe) for listeners that can fail.
	/// Failures go to the [error hook](Object::on_listener_error).
	#[must_use = "dropping the subscription unsubscribes the listener"]
	pub fn try_subscribe(
		&self,
		listener: impl Fn(&Change<'_>) -> Result<(), BoxError> + 'static,
	) -> Subscription {
		let id = self.body.listeners.borrow_mut().add(Rc::new(listener));
		Subscription {
			object: Rc::downgrade(&self.body),
			id,
			active: Cell::new(true),
		}
	}

	/// Installs the side channel for panicking or failing listeners,
	/// replacing the previous one. Without a hook failures are logged.
	pub fn on_listener_error(&self, hook: impl Fn(&ListenerError) + 'static) {
		*self.body.on_error.borrow_mut() = Some(Rc::new(hook));
	}

	pub fn listener_count(&self) -> usize {
		self.body.listeners.borrow().len()
	}
}

impl ObjectBody {
	/// Queues `announcements` and, unless a dispatch is already running
	/// further up the stack, delivers the queue until it is empty. Writes
	/// made by listeners land in the same queue and are delivered after the
	/// notifications already in it.
	fn dispatch(&self, announcements: Announcements) {
		self.pending.borrow_mut().extend(announcements);
		if self.dispatching.replace(true) {
			return;
		}

		let _guard = Dispatching(self);
		loop {
			let next = self.pending.borrow_mut().pop_front();
			let Some(id) = next else {
				break;
			};

			self.deliver(id);
		}
	}

	fn deliver(&self, id: PropertyId) {
		let change = Change::new(id, self.schema.name_of(id));
		tracing::trace!(property = change.name(), "announce");

		let snapshot = self.listeners.borrow().snapshot();
		for (_, listener) in snapshot {
			if let Err(error) = listeners::invoke(&change, || listener(&change)) {
				self.report(&error);
			}
		}
	}

	fn report(&self, error: &ListenerError) {
		let hook = self.on_error.borrow().clone();
		match hook {
			Some(hook) => hook(error),
			None => listeners::log_listener_error(error),
		}
	}
}

struct Dispatching<'a>(&'a ObjectBody);

impl Drop for Dispatching<'_> {
	fn drop(&mut self) {
		// A panicking error hook unwinds through here. What is left in the
		// queue belongs to that write and must not leak into the next one.
		if thread::panicking() {
			self.0.pending.borrow_mut().clear();
		}
		self.0.dispatching.set(false);
	}
}

impl WeakObject {
	pub fn upgrade(&self) -> Option<Object> {
		self.body.upgrade().map(|body| Object { body })
	}
}

/// Keeps a listener registered. Dropping it unsubscribes.
pub struct Subscription {
	object: Weak<ObjectBody>,
	id: ListenerId,
	active: Cell<bool>,
}

impl Subscription {
	pub fn id(&self) -> ListenerId {
		self.id
	}

	/// Removes the listener. Calling this more than once, or after the
	/// object is gone, does nothing.
	pub fn unsubscribe(&self) {
		if !self.active.replace(false) {
			return;
		}

		if let Some(body) = self.object.upgrade() {
			body.listeners.borrow_mut().remove(self.id);
		}
	}

	/// Keeps the listener registered for as long as the object lives.
	pub fn forget(self) {
		self.active.set(false);
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.unsubscribe();
	}
}

impl Debug for Object {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Object")
			.field("schema", &self.body.schema)
			.field("listeners", &self.listener_count())
			.finish()
	}
}

impl Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.active.get())
			.finish()
	}
}
