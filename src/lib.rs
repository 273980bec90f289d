//! Objects made of stored ("base") and computed properties, where every write
//! to a base property notifies listeners about the written property and about
//! each computed property whose value changed because of it.
//!
//! A [`Schema`] declares the properties of one kind of object together with
//! the dependencies of each computed property. Instances are created from the
//! schema through [`rc::Object`] (single-threaded) or [`arc::Object`]
//! (shareable between threads).
//!
//! ```
//! use observe_props::{rc::Object, Schema};
//!
//! let mut builder = Schema::builder();
//! let age = builder.base("Age", 15u32).unwrap();
//! let citizen = builder.base("Citizen", false).unwrap();
//! let can_vote = builder
//! 	.computed("CanVote", &["Citizen", "Age"], move |cx| {
//! 		*cx.get(&citizen) && *cx.get(&age) >= 16
//! 	})
//! 	.unwrap();
//! let schema = builder.build().unwrap();
//!
//! let person = Object::new(schema);
//! person.set(&age, 16);
//! assert!(!person.get(&can_vote));
//! person.set(&citizen, true);
//! assert!(person.get(&can_vote));
//! ```

pub mod arc;
pub mod rc;

mod cascade;
mod error;
mod evaluation;
mod graph;
mod listeners;
mod schema;
mod store;
mod value;

use std::fmt;

pub use error::{BoxError, ListenerError, LookupError, SchemaError};
pub use evaluation::{Evaluation, Ref};
pub use graph::DependencyGraph;
pub use listeners::{Change, ListenerId};
pub use schema::{Computed, Schema, SchemaBuilder, SchemaId, UndeclaredReads, Var};
pub use value::PropertyValue;

/// Index of a property inside its schema. Ids are assigned in declaration
/// order and never change once the schema is built.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(pub(crate) u32);

impl PropertyId {
	#[inline]
	pub fn index(self) -> usize {
		self.0 as usize
	}
}

impl fmt::Debug for PropertyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// A typed handle to a property of some schema.
pub trait Property: Copy {
	type Value: PropertyValue;

	fn id(&self) -> PropertyId;

	/// The schema this handle was issued by.
	fn schema(&self) -> SchemaId;
}
