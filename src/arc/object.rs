use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::{Mutex, ReentrantMutex};

use crate::cascade::{self, Announcements};
use crate::error::{BoxError, ListenerError, LookupError};
use crate::evaluation::Evaluation;
use crate::listeners::{self, Change, ListenerId, ListenerRegistry};
use crate::store::PropertyStore;
use crate::value::{PropertyValue, Value};
use crate::{Property, PropertyId, Schema, Var};

type Listener = dyn Fn(&Change<'_>) -> Result<(), BoxError> + Send + Sync;
type ErrorHook = dyn Fn(&ListenerError) + Send + Sync;

/// An instance of a [`Schema`] that is `Send + Sync`. Clones share the same
/// state.
#[derive(Clone)]
pub struct Object {
	body: Arc<ObjectBody>,
}

#[derive(Clone)]
pub struct WeakObject {
	body: Weak<ObjectBody>,
}

#[derive(Default)]
struct Dispatch {
	pending: VecDeque<PropertyId>,
	running: bool,
}

struct ObjectBody {
	schema: Arc<Schema>,
	/// Held for a whole write including delivery. Reentrant so listeners on
	/// the writing thread can write again.
	writer: ReentrantMutex<RefCell<Dispatch>>,
	store: Mutex<PropertyStore>,
	listeners: Mutex<ListenerRegistry<Arc<Listener>>>,
	on_error: Mutex<Option<Arc<ErrorHook>>>,
}

impl Object {
	pub fn new(schema: Arc<Schema>) -> Self {
		let store = PropertyStore::new(&schema);
		Object {
			body: Arc::new(ObjectBody {
				schema,
				writer: ReentrantMutex::new(RefCell::new(Dispatch::default())),
				store: Mutex::new(store),
				listeners: Mutex::new(ListenerRegistry::default()),
				on_error: Mutex::new(None),
			}),
		}
	}

	pub fn schema(&self) -> &Arc<Schema> {
		&self.body.schema
	}

	pub fn downgrade(&self) -> WeakObject {
		WeakObject {
			body: Arc::downgrade(&self.body),
		}
	}

	#[track_caller]
	pub fn get<P: Property>(&self, property: &P) -> P::Value {
		let store = self.body.store.lock();
		let value = Evaluation::new(&self.body.schema, &store, None)
			.get(property)
			.into_owned();
		value
	}

	#[track_caller]
	pub fn set<T: PropertyValue>(&self, var: &Var<T>, value: T) -> bool {
		self.body.schema.check(var);
		let writer = self.body.writer.lock();
		let announcements = {
			let mut store = self.body.store.lock();
			if !store.write(var.id(), Value::new(value)) {
				return false;
			}
			cascade::announce(&self.body.schema, &mut store, var.id())
		};

		self.body.dispatch(&writer, announcements);
		true
	}

	#[track_caller]
	pub fn replace<T: PropertyValue>(&self, var: &Var<T>, value: T) -> T {
		self.body.schema.check(var);
		let writer = self.body.writer.lock();
		let (old, announcements) = {
			let mut store = self.body.store.lock();
			let (old, changed) = store.replace(var.id(), value);
			if !changed {
				return old;
			}
			(old, cascade::announce(&self.body.schema, &mut store, var.id()))
		};

		self.body.dispatch(&writer, announcements);
		old
	}

	#[track_caller]
	pub fn update<T: PropertyValue>(&self, var: &Var<T>, func: impl FnOnce(&mut T)) -> bool {
		self.body.schema.check(var);
		let writer = self.body.writer.lock();
		let announcements = {
			let mut store = self.body.store.lock();
			if !store.update(var.id(), func) {
				return false;
			}
			cascade::announce(&self.body.schema, &mut store, var.id())
		};

		self.body.dispatch(&writer, announcements);
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

	#[must_use = "dropping the subscription unsubscribes the listener"]
	pub fn subscribe(
		&self,
		listener: impl Fn(&Change<'_>) + Send + Sync + 'static,
	) -> Subscription {
		self.try_subscribe(move |change| {
			listener(change);
			Ok(())
		})
	}

	#[must_use = "dropping the subscription unsubscribes the listener"]
	pub fn try_subscribe(
		&self,
		listener: impl Fn(&Change<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
	) -> Subscription {
		let id = self.body.listeners.lock().add(Arc::new(listener));
		Subscription {
			object: Arc::downgrade(&self.body),
			id,
			active: AtomicBool::new(true),
		}
	}

	pub fn on_listener_error(&self, hook: impl Fn(&ListenerError) + Send + Sync + 'static) {
		*self.body.on_error.lock() = Some(Arc::new(hook));
	}

	pub fn listener_count(&self) -> usize {
		self.body.listeners.lock().len()
	}
}

impl ObjectBody {
	fn dispatch(&self, writer: &RefCell<Dispatch>, announcements: Announcements) {
		{
			let mut dispatch = writer.borrow_mut();
			dispatch.pending.extend(announcements);
			if dispatch.running {
				return;
			}
			dispatch.running = true;
		}

		let _guard = Running(writer);
		loop {
			let next = writer.borrow_mut().pending.pop_front();
			let Some(id) = next else {
				break;
			};

			self.deliver(id);
		}
	}

	fn deliver(&self, id: PropertyId) {
		let change = Change::new(id, self.schema.name_of(id));
		tracing::trace!(property = change.name(), "announce");

		let snapshot = self.listeners.lock().snapshot();
		for (_, listener) in snapshot {
			if let Err(error) = listeners::invoke(&change, || listener(&change)) {
				self.report(&error);
			}
		}
	}

	fn report(&self, error: &ListenerError) {
		let hook = self.on_error.lock().clone();
		match hook {
			Some(hook) => hook(error),
			None => listeners::log_listener_error(error),
		}
	}
}

struct Running<'a>(&'a RefCell<Dispatch>);

impl Drop for Running<'_> {
	fn drop(&mut self) {
		let mut dispatch = self.0.borrow_mut();
		// Unwinding from the error hook; drop the rest of this write's queue.
		if thread::panicking() {
			dispatch.pending.clear();
		}
		dispatch.running = false;
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
	active: AtomicBool,
}

impl Subscription {
	pub fn id(&self) -> ListenerId {
		self.id
	}

	/// Removes the listener. Idempotent.
	pub fn unsubscribe(&self) {
		if !self.active.swap(false, Ordering::AcqRel) {
			return;
		}

		if let Some(body) = self.object.upgrade() {
			body.listeners.lock().remove(self.id);
		}
	}

	pub fn forget(self) {
		self.active.store(false, Ordering::Release);
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
			.field("active", &self.active.load(Ordering::Acquire))
			.finish()
	}
}
