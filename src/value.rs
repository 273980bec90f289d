use std::any::Any;

/// Anything that can live in a property slot.
pub trait PropertyValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> PropertyValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// Type-erased property value. Equality is structural and only holds
/// between values of the same concrete type.
pub(crate) trait Access: Send + Sync {
	fn as_any(&self) -> &dyn Any;
	fn as_any_mut(&mut self) -> &mut dyn Any;
	fn into_any(self: Box<Self>) -> Box<dyn Any>;
	fn same_as(&self, other: &dyn Access) -> bool;
	fn clone_value(&self) -> Value;
}

impl<T> Access for T
where
	T: PropertyValue,
{
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}

	fn into_any(self: Box<Self>) -> Box<dyn Any> {
		self
	}

	fn same_as(&self, other: &dyn Access) -> bool {
		other.as_any().downcast_ref::<T>() == Some(self)
	}

	fn clone_value(&self) -> Value {
		Value::new(self.clone())
	}
}

pub(crate) struct Value {
	inner: Box<dyn Access>,
}

impl Value {
	pub fn new<T: PropertyValue>(value: T) -> Self {
		Value {
			inner: Box::new(value),
		}
	}

	/// Panics if `T` is not the stored type. Handles are typed and checked
	/// against their schema before they reach a slot, so a mismatch here
	/// means the store itself is corrupt.
	pub fn downcast_ref<T: 'static>(&self) -> &T {
		match self.inner.as_any().downcast_ref::<T>() {
			Some(value) => value,
			None => panic!(
				"property slot does not hold a `{}`",
				std::any::type_name::<T>()
			),
		}
	}

	pub fn downcast_mut<T: 'static>(&mut self) -> &mut T {
		match self.inner.as_any_mut().downcast_mut::<T>() {
			Some(value) => value,
			None => panic!(
				"property slot does not hold a `{}`",
				std::any::type_name::<T>()
			),
		}
	}
}

impl Value {
	pub fn downcast<T: 'static>(self) -> T {
		match self.inner.into_any().downcast::<T>() {
			Ok(value) => *value,
			Err(_) => panic!(
				"property slot does not hold a `{}`",
				std::any::type_name::<T>()
			),
		}
	}
}

impl Clone for Value {
	fn clone(&self) -> Self {
		self.inner.clone_value()
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		self.inner.same_as(&*other.inner)
	}
}
