use std::any::TypeId;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{LookupError, SchemaError};
use crate::evaluation::Evaluation;
use crate::graph::DependencyGraph;
use crate::store::PropertyStore;
use crate::value::{PropertyValue, Value};
use crate::{Property, PropertyId};

pub(crate) type ComputeFn = Box<dyn Fn(&Evaluation<'_>) -> Value + Send + Sync>;

static NEXT_SCHEMA: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SchemaId(u64);

impl SchemaId {
	fn next() -> Self {
		SchemaId(NEXT_SCHEMA.fetch_add(1, Ordering::Relaxed))
	}
}

/// What to do when a compute function reads a property it did not list
/// among its dependencies. Such a read is invisible to the dependency graph,
/// so changes to that property will not re-announce the computed one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UndeclaredReads {
	Ignore,
	#[default]
	Warn,
	Panic,
}

/// Handle to a base property holding a `T`.
pub struct Var<T> {
	id: PropertyId,
	schema: SchemaId,
	_type: PhantomData<fn() -> T>,
}

/// Handle to a computed property producing a `T`.
pub struct Computed<T> {
	id: PropertyId,
	schema: SchemaId,
	_type: PhantomData<fn() -> T>,
}

macro_rules! handle {
	($name:ident) => {
		impl<T> $name<T> {
			fn new(id: PropertyId, schema: SchemaId) -> Self {
				$name {
					id,
					schema,
					_type: PhantomData,
				}
			}
		}

		impl<T> Clone for $name<T> {
			fn clone(&self) -> Self {
				*self
			}
		}

		impl<T> Copy for $name<T> {}

		impl<T> PartialEq for $name<T> {
			fn eq(&self, other: &Self) -> bool {
				self.id == other.id && self.schema == other.schema
			}
		}

		impl<T> Eq for $name<T> {}

		impl<T> Debug for $name<T> {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.debug_tuple(stringify!($name)).field(&self.id).finish()
			}
		}

		impl<T: PropertyValue> Property for $name<T> {
			type Value = T;

			#[inline]
			fn id(&self) -> PropertyId {
				self.id
			}

			#[inline]
			fn schema(&self) -> SchemaId {
				self.schema
			}
		}
	};
}

handle!(Var);
handle!(Computed);

pub(crate) enum Binding {
	Base(Value),
	Computed(ComputeFn),
}

pub(crate) struct Declaration {
	pub name: String,
	pub type_id: TypeId,
	pub type_name: &'static str,
	pub binding: Binding,
}

struct Pending {
	name: String,
	type_id: TypeId,
	type_name: &'static str,
	binding: Option<Binding>,
}

/// Collects property declarations and validates the dependency graph as it
/// grows. Every rejected declaration leaves the builder as it was.
pub struct SchemaBuilder {
	id: SchemaId,
	declarations: Vec<Pending>,
	names: FxHashMap<String, PropertyId>,
	graph: DependencyGraph,
	undeclared_reads: UndeclaredReads,
}

impl Default for SchemaBuilder {
	fn default() -> Self {
		SchemaBuilder::new()
	}
}

impl SchemaBuilder {
	pub fn new() -> Self {
		SchemaBuilder {
			id: SchemaId::next(),
			declarations: Vec::new(),
			names: FxHashMap::default(),
			graph: DependencyGraph::new(),
			undeclared_reads: UndeclaredReads::default(),
		}
	}

	pub fn undeclared_reads(&mut self, policy: UndeclaredReads) -> &mut Self {
		self.undeclared_reads = policy;
		self
	}

	/// Declares a stored property. Every object starts with a clone of
	/// `initial`.
	pub fn base<T>(&mut self, name: &str, initial: T) -> Result<Var<T>, SchemaError>
	where
		T: PropertyValue,
	{
		let id = self.insert::<T>(name, Some(Binding::Base(Value::new(initial))))?;
		Ok(Var::new(id, self.id))
	}

	/// Declares and defines a computed property in one step.
	pub fn computed<T, F>(
		&mut self,
		name: &str,
		deps: &[&str],
		compute: F,
	) -> Result<Computed<T>, SchemaError>
	where
		T: PropertyValue,
		F: Fn(&Evaluation<'_>) -> T + Send + Sync + 'static,
	{
		let computed = self.declare::<T>(name)?;
		if let Err(err) = self.define(&computed, deps, compute) {
			self.rollback(computed.id);
			return Err(err);
		}

		Ok(computed)
	}

	/// Reserves the name of a computed property so that other properties can
	/// depend on it before it is [defined](SchemaBuilder::define).
	pub fn declare<T>(&mut self, name: &str) -> Result<Computed<T>, SchemaError>
	where
		T: PropertyValue,
	{
		let id = self.insert::<T>(name, None)?;
		Ok(Computed::new(id, self.id))
	}

	pub fn define<T, F>(
		&mut self,
		computed: &Computed<T>,
		deps: &[&str],
		compute: F,
	) -> Result<(), SchemaError>
	where
		T: PropertyValue,
		F: Fn(&Evaluation<'_>) -> T + Send + Sync + 'static,
	{
		if computed.schema != self.id {
			return Err(SchemaError::ForeignHandle(computed.id.0));
		}

		let declaration = &self.declarations[computed.id.index()];
		if declaration.binding.is_some() {
			return Err(SchemaError::DuplicateRegistration(declaration.name.clone()));
		}

		let mut ids = SmallVec::<[PropertyId; 4]>::with_capacity(deps.len());
		for dep in deps {
			match self.names.get(*dep) {
				Some(id) => ids.push(*id),
				None => {
					return Err(SchemaError::UnknownProperty {
						property: declaration.name.clone(),
						dependency: dep.to_string(),
					})
				}
			}
		}

		if let Err(path) = self.graph.connect(computed.id, &ids) {
			return Err(SchemaError::CyclicDependency {
				property: declaration.name.clone(),
				path: path
					.into_iter()
					.map(|id| self.declarations[id.index()].name.clone())
					.collect(),
			});
		}

		tracing::debug!(property = %declaration.name, ?deps, "defined computed property");

		self.declarations[computed.id.index()].binding = Some(Binding::Computed(Box::new(
			move |cx: &Evaluation<'_>| Value::new(compute(cx)),
		)));

		Ok(())
	}

	pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
		let mut declarations = Vec::with_capacity(self.declarations.len());
		for pending in self.declarations {
			let Some(binding) = pending.binding else {
				return Err(SchemaError::Undefined(pending.name));
			};

			declarations.push(Declaration {
				name: pending.name,
				type_id: pending.type_id,
				type_name: pending.type_name,
				binding,
			});
		}

		tracing::debug!(properties = declarations.len(), "built schema");

		Ok(Arc::new(Schema {
			id: self.id,
			declarations,
			names: self.names,
			graph: self.graph,
			undeclared_reads: self.undeclared_reads,
		}))
	}

	fn insert<T: 'static>(
		&mut self,
		name: &str,
		binding: Option<Binding>,
	) -> Result<PropertyId, SchemaError> {
		if self.names.contains_key(name) {
			return Err(SchemaError::DuplicateRegistration(name.to_string()));
		}

		let id = self.graph.add_node();
		self.names.insert(name.to_string(), id);
		self.declarations.push(Pending {
			name: name.to_string(),
			type_id: TypeId::of::<T>(),
			type_name: std::any::type_name::<T>(),
			binding,
		});

		Ok(id)
	}

	fn rollback(&mut self, id: PropertyId) {
		debug_assert_eq!(id.index() + 1, self.declarations.len());
		if let Some(pending) = self.declarations.pop() {
			self.names.remove(&pending.name);
			self.graph.pop_node();
		}
	}
}

/// The immutable description of one kind of object: its properties, their
/// compute functions and the dependency graph between them.
pub struct Schema {
	id: SchemaId,
	declarations: Vec<Declaration>,
	names: FxHashMap<String, PropertyId>,
	graph: DependencyGraph,
	undeclared_reads: UndeclaredReads,
}

impl Schema {
	pub fn builder() -> SchemaBuilder {
		SchemaBuilder::new()
	}

	pub fn id(&self) -> SchemaId {
		self.id
	}

	pub fn len(&self) -> usize {
		self.declarations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.declarations.is_empty()
	}

	pub fn graph(&self) -> &DependencyGraph {
		&self.graph
	}

	pub fn id_of(&self, name: &str) -> Option<PropertyId> {
		self.names.get(name).copied()
	}

	/// # Panics
	///
	/// This and the other id-based accessors panic when `id` was not issued
	/// by this schema.
	#[track_caller]
	pub fn name_of(&self, id: PropertyId) -> &str {
		&self.declaration(id).name
	}

	#[track_caller]
	pub fn is_computed(&self, id: PropertyId) -> bool {
		matches!(self.declaration(id).binding, Binding::Computed(_))
	}

	#[track_caller]
	pub fn dependencies(&self, id: PropertyId) -> &[PropertyId] {
		self.declaration(id);
		self.graph.dependencies(id)
	}

	#[track_caller]
	pub fn dependents(&self, id: PropertyId) -> &[PropertyId] {
		self.declaration(id);
		self.graph.dependents(id)
	}

	#[track_caller]
	fn declaration(&self, id: PropertyId) -> &Declaration {
		match self.declarations.get(id.index()) {
			Some(declaration) => declaration,
			None => panic!(
				"property {id:?} is not part of this schema ({} properties)",
				self.declarations.len()
			),
		}
	}

	pub fn var<T: PropertyValue>(&self, name: &str) -> Result<Var<T>, LookupError> {
		let id = self.lookup::<T>(name)?;
		if self.is_computed(id) {
			return Err(LookupError::NotSettable(name.to_string()));
		}

		Ok(Var::new(id, self.id))
	}

	pub fn computed<T: PropertyValue>(&self, name: &str) -> Result<Computed<T>, LookupError> {
		let id = self.lookup::<T>(name)?;
		if !self.is_computed(id) {
			return Err(LookupError::NotComputed(name.to_string()));
		}

		Ok(Computed::new(id, self.id))
	}

	pub(crate) fn lookup<T: 'static>(&self, name: &str) -> Result<PropertyId, LookupError> {
		let id = self
			.id_of(name)
			.ok_or_else(|| LookupError::UnknownProperty(name.to_string()))?;

		if self.declaration(id).type_id != TypeId::of::<T>() {
			return Err(LookupError::TypeMismatch {
				property: name.to_string(),
				expected: std::any::type_name::<T>(),
			});
		}

		Ok(id)
	}

	pub(crate) fn declarations(&self) -> impl Iterator<Item = (PropertyId, &Declaration)> {
		self.declarations
			.iter()
			.enumerate()
			.map(|(index, declaration)| (PropertyId(index as u32), declaration))
	}

	/// Panics when `property` was issued by another schema.
	#[track_caller]
	pub(crate) fn check(&self, property: &impl Property) {
		assert!(
			property.schema() == self.id,
			"property {:?} belongs to another schema",
			property.id()
		);
	}

	/// Runs the compute function of `id` against the current contents of
	/// `store`. Nothing is cached.
	pub(crate) fn evaluate(&self, id: PropertyId, store: &PropertyStore) -> Value {
		let declaration = self.declaration(id);
		let Binding::Computed(compute) = &declaration.binding else {
			return store.base(id).clone();
		};

		let cx = Evaluation::new(self, store, Some(id));
		let value = compute(&cx);
		cx.finish(self.undeclared_reads);
		value
	}
}

impl Debug for Schema {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map()
			.entries(
				self.declarations
					.iter()
					.map(|declaration| (&declaration.name, declaration.type_name)),
			)
			.finish()
	}
}
