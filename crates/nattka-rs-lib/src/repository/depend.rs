//! Dependency specifications (`DEPEND` and friends).

use serde::{Serialize, Deserialize};

use super::atom::Atom;

/// Dependency class, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DepType {
	Bdepend,
	Depend,
	Rdepend,
	Pdepend,
}

impl DepType {
	pub const ALL: [DepType; 4] = [DepType::Bdepend, DepType::Depend, DepType::Rdepend, DepType::Pdepend];

	pub fn variable(&self) -> &'static str {
		match self {
			Self::Bdepend => "BDEPEND",
			Self::Depend => "DEPEND",
			Self::Rdepend => "RDEPEND",
			Self::Pdepend => "PDEPEND",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepNode {
	Atom(Atom),
	/// `( a b )`
	AllOf(Vec<DepNode>),
	/// `|| ( a b )`
	AnyOf(Vec<DepNode>),
	/// `^^ ( a b )`
	ExactlyOneOf(Vec<DepNode>),
	/// `?? ( a b )`
	AtMostOneOf(Vec<DepNode>),
	/// `flag? ( a b )` or `!flag? ( a b )`
	Conditional { flag: String, negated: bool, children: Vec<DepNode> },
}

impl DepNode {
	fn children(&self) -> Option<&[DepNode]> {
		match self {
			DepNode::Atom(_) => None,
			DepNode::AllOf(c)
			| DepNode::AnyOf(c)
			| DepNode::ExactlyOneOf(c)
			| DepNode::AtMostOneOf(c)
			| DepNode::Conditional { children: c, .. } => Some(c),
		}
	}
}

/// Parses a whitespace separated dependency specification.
pub fn parse_dependencies(s: &str) -> crate::Result<Vec<DepNode>> {
	let mut tokens = s.split_whitespace().peekable();
	let nodes = parse_group(&mut tokens, false)?;
	Ok(nodes)
}

fn parse_group<'a, I: Iterator<Item = &'a str>>(tokens: &mut std::iter::Peekable<I>, nested: bool) -> crate::Result<Vec<DepNode>> {
	let mut nodes = Vec::new();

	fn open_paren<'a, I: Iterator<Item = &'a str>>(tokens: &mut std::iter::Peekable<I>, after: &str) -> crate::Result<()> {
		match tokens.next() {
			Some("(") => Ok(()),
			_ => Err(crate::Error::Parse(format!("expected ( after {}", after))),
		}
	}

	while let Some(tok) = tokens.next() {
		let node = match tok {
			")" if nested => return Ok(nodes),
			")" => return Err(crate::Error::Parse("unbalanced )".to_string())),
			"(" => DepNode::AllOf(parse_group(tokens, true)?),
			"||" | "^^" | "??" => {
				open_paren(tokens, tok)?;
				let children = parse_group(tokens, true)?;
				match tok {
					"||" => DepNode::AnyOf(children),
					"^^" => DepNode::ExactlyOneOf(children),
					_ => DepNode::AtMostOneOf(children),
				}
			},
			t if t.ends_with('?') => {
				open_paren(tokens, t)?;
				let flag = &t[..t.len() - 1];
				let (flag, negated) = match flag.strip_prefix('!') {
					Some(f) => (f, true),
					None => (flag, false),
				};
				DepNode::Conditional { flag: flag.to_string(), negated, children: parse_group(tokens, true)? }
			},
			t => DepNode::Atom(Atom::parse(t)?),
		};
		nodes.push(node);
	}

	if nested {
		Err(crate::Error::Parse("unbalanced (".to_string()))
	} else {
		Ok(nodes)
	}
}

/// Flattens a dependency tree into `(category/package, nesting level)` pairs.
/// 
/// Each group (any-of, all-of or USE conditional) adds one level. Blockers are skipped.
pub fn traverse_dependencies(nodes: &[DepNode]) -> Vec<(String, usize)> {
	fn walk(nodes: &[DepNode], level: usize, out: &mut Vec<(String, usize)>) {
		for n in nodes {
			match n {
				DepNode::Atom(a) if a.blocker.is_some() => {},
				DepNode::Atom(a) => out.push((a.key(), level)),
				group => walk(group.children().unwrap_or_default(), level + 1, out),
			}
		}
	}

	let mut out = Vec::new();
	walk(nodes, 0, &mut out);
	out
}

/// All atoms in the tree, regardless of conditionals.
pub fn all_atoms(nodes: &[DepNode]) -> Vec<&Atom> {
	let mut out = Vec::new();
	let mut stack: Vec<&DepNode> = nodes.iter().rev().collect();
	while let Some(n) = stack.pop() {
		match n {
			DepNode::Atom(a) => out.push(a),
			group => stack.extend(group.children().unwrap_or_default().iter().rev()),
		}
	}
	out
}
