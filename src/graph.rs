use smallvec::SmallVec;

use crate::PropertyId;

pub(crate) type Edges = SmallVec<[PropertyId; 4]>;

/// Which computed properties have to be re-evaluated when a property changes.
///
/// Properties are nodes addressed by [`PropertyId`]. An edge `a -> b` means
/// `b` is computed from `a`. The graph is kept acyclic: [`connect`] refuses
/// any edge set that would close a cycle and leaves the graph untouched.
///
/// [`connect`]: DependencyGraph::connect
#[derive(Default, Clone, Debug)]
pub struct DependencyGraph {
	dependents: Vec<Edges>,
	dependencies: Vec<Edges>,
}

impl DependencyGraph {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.dependents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.dependents.is_empty()
	}

	/// Properties that must be re-evaluated when `id` changes, in the order
	/// they were connected.
	pub fn dependents(&self, id: PropertyId) -> &[PropertyId] {
		&self.dependents[id.index()]
	}

	/// Properties `id` is computed from.
	pub fn dependencies(&self, id: PropertyId) -> &[PropertyId] {
		&self.dependencies[id.index()]
	}

	pub(crate) fn add_node(&mut self) -> PropertyId {
		let id = PropertyId(self.dependents.len() as u32);
		self.dependents.push(Edges::new());
		self.dependencies.push(Edges::new());
		id
	}

	/// Removes the most recently added node. It must have no edges.
	pub(crate) fn pop_node(&mut self) {
		self.dependents.pop();
		self.dependencies.pop();
	}

	/// Adds the edges `dep -> derived` for every dep.
	///
	/// On a cycle nothing is inserted and the offending path is returned,
	/// starting and ending at `derived`.
	pub(crate) fn connect(
		&mut self,
		derived: PropertyId,
		deps: &[PropertyId],
	) -> Result<(), Vec<PropertyId>> {
		for &dep in deps {
			if dep == derived {
				return Err(vec![derived, derived]);
			}

			if let Some(mut path) = self.path(derived, dep) {
				path.push(derived);
				return Err(path);
			}
		}

		for &dep in deps {
			if self.dependencies[derived.index()].contains(&dep) {
				continue;
			}

			self.dependencies[derived.index()].push(dep);
			self.dependents[dep.index()].push(derived);
		}

		Ok(())
	}

	/// Depth-first search along dependent edges.
	fn path(&self, from: PropertyId, to: PropertyId) -> Option<Vec<PropertyId>> {
		let mut seen = vec![false; self.len()];
		let mut path = vec![from];
		let mut stack: Vec<(PropertyId, usize)> = vec![(from, 0)];
		seen[from.index()] = true;

		while let Some((node, next)) = stack.last_mut() {
			if *node == to {
				return Some(path);
			}

			match self.dependents[node.index()].get(*next) {
				Some(&child) => {
					*next += 1;
					if !seen[child.index()] {
						seen[child.index()] = true;
						stack.push((child, 0));
						path.push(child);
					}
				}
				None => {
					stack.pop();
					path.pop();
				}
			}
		}

		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn graph(nodes: usize) -> (DependencyGraph, Vec<PropertyId>) {
		let mut graph = DependencyGraph::new();
		let ids = (0..nodes).map(|_| graph.add_node()).collect();
		(graph, ids)
	}

	#[test]
	fn connect_records_both_directions() {
		let (mut graph, ids) = graph(3);
		graph.connect(ids[2], &[ids[0], ids[1]]).unwrap();

		assert_eq!(graph.dependencies(ids[2]), &[ids[0], ids[1]]);
		assert_eq!(graph.dependents(ids[0]), &[ids[2]]);
		assert_eq!(graph.dependents(ids[1]), &[ids[2]]);
	}

	#[test]
	fn duplicate_deps_are_collapsed() {
		let (mut graph, ids) = graph(2);
		graph.connect(ids[1], &[ids[0], ids[0]]).unwrap();

		assert_eq!(graph.dependencies(ids[1]), &[ids[0]]);
		assert_eq!(graph.dependents(ids[0]), &[ids[1]]);
	}

	#[test]
	fn self_dependency_is_a_cycle() {
		let (mut graph, ids) = graph(1);
		assert_eq!(graph.connect(ids[0], &[ids[0]]), Err(vec![ids[0], ids[0]]));
	}

	#[test]
	fn transitive_cycle_is_rejected_without_partial_edges() {
		let (mut graph, ids) = graph(4);
		let [a, x, y, z] = [ids[0], ids[1], ids[2], ids[3]];

		graph.connect(y, &[x]).unwrap();
		graph.connect(z, &[y]).unwrap();

		// `a` is fine, `z` closes x -> y -> z -> x.
		assert_eq!(graph.connect(x, &[a, z]), Err(vec![x, y, z, x]));
		assert!(graph.dependencies(x).is_empty());
		assert!(graph.dependents(a).is_empty());
	}

	#[test]
	fn diamond_is_not_a_cycle() {
		let (mut graph, ids) = graph(4);
		let [a, b, c, d] = [ids[0], ids[1], ids[2], ids[3]];

		graph.connect(b, &[a]).unwrap();
		graph.connect(c, &[a]).unwrap();
		graph.connect(d, &[b, c]).unwrap();

		assert_eq!(graph.dependents(a), &[b, c]);
	}
}
