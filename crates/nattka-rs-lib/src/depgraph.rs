//! Ordering packages so that dependencies come before their dependents.

use std::collections::{HashMap, HashSet};

use petgraph::prelude::*;
use serde::{Serialize, Deserialize};

use crate::repository::{DepType, PackageCandidate};
use crate::repository::depend::traverse_dependencies;

/// Strength of a dependency, lower is stronger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeData {
	pub dep_type: DepType,
	/// Number of groups the dependency is nested in, 0 is unconditional.
	pub level: usize,
}

/// `(from, to)` package keys.
pub type Edge = (String, String);
/// A cycle found in the graph and the edge removed to break it.
pub type CycleEvent = (Vec<Edge>, Edge);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
	pub graph: StableDiGraph<String, EdgeData>,
	nodes: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a graph over the keys of `pkgs`, dependencies outside the set are ignored.
	pub fn from_packages<'a>(pkgs: impl IntoIterator<Item = &'a PackageCandidate>) -> Self {
		let pkgs: Vec<&PackageCandidate> = pkgs.into_iter().collect();
		let mut g = Self::new();
		for p in &pkgs {
			g.add_node(&p.key());
		}
		for p in &pkgs {
			let key = p.key();
			for dep_type in DepType::ALL {
				for (dep, level) in traverse_dependencies(p.dependencies(dep_type)) {
					g.add_edge(&key, &dep, EdgeData { dep_type, level });
				}
			}
		}
		g
	}

	pub fn add_node(&mut self, key: &str) -> NodeIndex {
		if let Some(&i) = self.nodes.get(key) {
			return i;
		}
		let i = self.graph.add_node(key.to_string());
		self.nodes.insert(key.to_string(), i);
		i
	}

	/// Adds an edge between two existing nodes, or makes an existing one stronger.
	/// 
	/// Returns false when either node is missing from the graph.
	pub fn add_edge(&mut self, from: &str, to: &str, data: EdgeData) -> bool {
		let (Some(&a), Some(&b)) = (self.nodes.get(from), self.nodes.get(to)) else {
			return false;
		};
		match self.graph.find_edge(a, b) {
			Some(e) => {
				if let Some(existing) = self.graph.edge_weight_mut(e) {
					if data < *existing {
						*existing = data;
					}
				}
			},
			None => { self.graph.add_edge(a, b, data); },
		}
		true
	}

	/// Node keys in insertion order.
	pub fn nodes(&self) -> Vec<&str> {
		self.graph.node_indices().map(|i| self.graph[i].as_str()).collect()
	}

	/// All edges, sorted by their endpoints.
	pub fn edges(&self) -> Vec<(String, String, EdgeData)> {
		let mut out: Vec<_> = self.graph.edge_indices()
			.filter_map(|e| {
				let (a, b) = self.graph.edge_endpoints(e)?;
				Some((self.graph[a].clone(), self.graph[b].clone(), self.graph[e]))
			})
			.collect();
		out.sort();
		out
	}

	fn edge_names(&self, e: EdgeIndex) -> Edge {
		match self.graph.edge_endpoints(e) {
			Some((a, b)) => (self.graph[a].clone(), self.graph[b].clone()),
			None => Default::default(),
		}
	}

	/// Outgoing edges in the order they were added.
	fn successors(&self, node: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
		let mut out: Vec<_> = self.graph.edges(node).map(|e| (e.id(), e.target())).collect();
		out.sort();
		out
	}

	fn cycle_from(&self, node: NodeIndex, visited: &mut HashSet<NodeIndex>, stack: &mut Vec<NodeIndex>, path: &mut Vec<EdgeIndex>) -> Option<Vec<EdgeIndex>> {
		visited.insert(node);
		stack.push(node);
		for (e, next) in self.successors(node) {
			if let Some(pos) = stack.iter().position(|&n| n == next) {
				let mut cycle = path[pos..].to_vec();
				cycle.push(e);
				return Some(cycle);
			}
			if visited.contains(&next) {
				continue;
			}
			path.push(e);
			if let Some(cycle) = self.cycle_from(next, visited, stack, path) {
				return Some(cycle);
			}
			path.pop();
		}
		stack.pop();
		None
	}

	/// First cycle found by a depth-first search in insertion order.
	/// 
	/// The cycle starts at the first node on it that the search entered.
	fn find_cycle(&self) -> Option<Vec<EdgeIndex>> {
		let mut visited = HashSet::new();
		for start in self.graph.node_indices() {
			if visited.contains(&start) {
				continue;
			}
			if let Some(cycle) = self.cycle_from(start, &mut visited, &mut Vec::new(), &mut Vec::new()) {
				return Some(cycle);
			}
		}
		None
	}

	fn postorder_from(&self, node: NodeIndex, visited: &mut HashSet<NodeIndex>, out: &mut Vec<NodeIndex>) {
		visited.insert(node);
		for (_, next) in self.successors(node) {
			if !visited.contains(&next) {
				self.postorder_from(next, visited, out);
			}
		}
		out.push(node);
	}

	/// Removes the weakest edge of every cycle, then returns the keys in depth-first postorder.
	/// 
	/// `observer` is called with each cycle before its edge is removed.
	/// When several edges of a cycle are equally weak the first one on the cycle goes.
	pub fn ordered_nodes(mut self, mut observer: impl FnMut(CycleEvent)) -> Vec<String> {
		while let Some(cycle) = self.find_cycle() {
			let mut weakest = cycle[0];
			for &e in &cycle[1..] {
				if self.graph[e] > self.graph[weakest] {
					weakest = e;
				}
			}
			let removed = self.edge_names(weakest);
			log::debug!("Breaking dependency cycle at {} -> {}", removed.0, removed.1);
			observer((cycle.iter().map(|&e| self.edge_names(e)).collect(), removed));
			self.graph.remove_edge(weakest);
		}

		let mut visited = HashSet::new();
		let mut out = Vec::new();
		for start in self.graph.node_indices() {
			if !visited.contains(&start) {
				self.postorder_from(start, &mut visited, &mut out);
			}
		}
		out.into_iter().map(|i| self.graph[i].clone()).collect()
	}
}

/// Sorts `pkgs` dependencies first, versions of one package ascending.
pub fn order_packages<'a>(pkgs: impl IntoIterator<Item = &'a PackageCandidate>) -> Vec<&'a PackageCandidate> {
	let mut pkgs: Vec<&PackageCandidate> = pkgs.into_iter().collect();
	let order = DependencyGraph::from_packages(pkgs.iter().copied()).ordered_nodes(|_| {});
	let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, k)| (k.as_str(), i)).collect();
	pkgs.sort_by(|a, b| {
		let pa = position.get(a.key().as_str()).copied().unwrap_or(usize::MAX);
		let pb = position.get(b.key().as_str()).copied().unwrap_or(usize::MAX);
		pa.cmp(&pb).then_with(|| a.version.cmp(&b.version))
	});
	pkgs
}
