use smallvec::SmallVec;

use crate::schema::Schema;
use crate::store::PropertyStore;
use crate::PropertyId;

/// Properties to announce for one write, in delivery order.
pub(crate) type Announcements = SmallVec<[PropertyId; 8]>;

struct Cascade<'a> {
	schema: &'a Schema,
	store: &'a mut PropertyStore,
	visited: Vec<bool>,
	out: Announcements,
}

/// Walks the dependency graph from a base property that was just written.
///
/// The written property is always announced. A dependent is re-evaluated
/// and announced only when its value differs from the last announced one,
/// and its own dependents are visited only in that case. Each property is
/// announced at most once per walk.
pub(crate) fn announce(schema: &Schema, store: &mut PropertyStore, origin: PropertyId) -> Announcements {
	let mut cascade = Cascade {
		schema,
		store,
		visited: vec![false; schema.len()],
		out: Announcements::new(),
	};

	cascade.visit(origin);
	cascade.out
}

impl<'a> Cascade<'a> {
	fn visit(&mut self, id: PropertyId) {
		if std::mem::replace(&mut self.visited[id.index()], true) {
			return;
		}

		self.out.push(id);

		let schema = self.schema;
		for &derived in schema.dependents(id) {
			if self.visited[derived.index()] {
				continue;
			}

			let value = schema.evaluate(derived, self.store);
			if self.store.announced(derived) == Some(&value) {
				tracing::trace!(property = schema.name_of(derived), "unchanged");
				continue;
			}

			self.store.set_announced(derived, value);
			self.visit(derived);
		}
	}
}
