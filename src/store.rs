use crate::schema::{Binding, Schema};
use crate::value::{PropertyValue, Value};
use crate::PropertyId;

enum Slot {
	Base(Value),
	/// The value listeners were last told about.
	Computed(Option<Value>),
}

/// Per-object property state: the stored base values and, for each computed
/// property, the snapshot used to decide whether it changed.
pub(crate) struct PropertyStore {
	slots: Vec<Slot>,
}

impl PropertyStore {
	/// Fills base slots with the schema's initial values and takes the first
	/// snapshot of every computed property.
	pub fn new(schema: &Schema) -> Self {
		let slots = schema
			.declarations()
			.map(|(_, declaration)| match &declaration.binding {
				Binding::Base(initial) => Slot::Base(initial.clone()),
				Binding::Computed(_) => Slot::Computed(None),
			})
			.collect();

		let mut store = PropertyStore { slots };
		let snapshots: Vec<(PropertyId, Value)> = schema
			.declarations()
			.filter(|(id, _)| schema.is_computed(*id))
			.map(|(id, _)| (id, schema.evaluate(id, &store)))
			.collect();

		for (id, value) in snapshots {
			store.set_announced(id, value);
		}

		store
	}

	pub fn base(&self, id: PropertyId) -> &Value {
		match &self.slots[id.index()] {
			Slot::Base(value) => value,
			Slot::Computed(_) => panic!("property {id:?} is not a base property"),
		}
	}

	fn base_mut(&mut self, id: PropertyId) -> &mut Value {
		match &mut self.slots[id.index()] {
			Slot::Base(value) => value,
			Slot::Computed(_) => panic!("property {id:?} is not a base property"),
		}
	}

	/// Stores `value` unless it equals the current one. Returns whether the
	/// slot changed.
	pub fn write(&mut self, id: PropertyId, value: Value) -> bool {
		let slot = self.base_mut(id);
		if *slot == value {
			return false;
		}

		*slot = value;
		true
	}

	/// Stores `value` and hands back the previous one, reporting whether
	/// they differ.
	pub fn replace<T: PropertyValue>(&mut self, id: PropertyId, value: T) -> (T, bool) {
		let slot = self.base_mut(id).downcast_mut::<T>();
		let changed = *slot != value;
		(std::mem::replace(slot, value), changed)
	}

	/// Mutates the stored value in place, reporting whether it changed.
	pub fn update<T: PropertyValue>(&mut self, id: PropertyId, func: impl FnOnce(&mut T)) -> bool {
		let slot = self.base_mut(id).downcast_mut::<T>();
		let before = slot.clone();
		func(slot);
		*slot != before
	}

	pub fn announced(&self, id: PropertyId) -> Option<&Value> {
		match &self.slots[id.index()] {
			Slot::Computed(announced) => announced.as_ref(),
			Slot::Base(_) => None,
		}
	}

	pub fn set_announced(&mut self, id: PropertyId, value: Value) {
		if let Slot::Computed(announced) = &mut self.slots[id.index()] {
			*announced = Some(value);
		}
	}
}
