//! Splitting package list lines into an atom and keyword tokens.

use regex::Regex;

use crate::repository::atom::{Atom, AtomOperator};
use super::MatchError;

/// One meaningful line of a package list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLine {
	/// The atom as it was accepted, including an implied leading `=`.
	pub spec: String,
	/// The first token exactly as written.
	pub token: String,
	pub atom: Atom,
	/// Keyword tokens with any leading `~` removed.
	pub keywords: Vec<String>,
}

/// Removes a `#` comment, whole-line or trailing.
pub fn strip_comment(line: &str) -> &str {
	let re = Regex::new(r"(^|\s)#").expect("static regex");
	match re.find(line) {
		Some(m) => &line[..m.start()],
		None => line,
	}
}

/// Parses a line of a package list.
/// 
/// Returns `Ok(None)` for blank and comment-only lines. The first token is tried
/// as `=token` and then as written. Stabilization requests only accept plain
/// `=` atoms without a slot.
pub fn parse_line(line: &str, stablereq: bool) -> Result<Option<PackageLine>, MatchError> {
	let mut tokens = strip_comment(line).split_whitespace();
	let Some(first) = tokens.next() else {
		return Ok(None);
	};

	let mut spec = String::new();
	let mut atom = None;
	for prefix in ["=", ""] {
		spec = format!("{}{}", prefix, first);
		if let Ok(a) = Atom::parse(&spec) {
			atom = Some(a);
			break;
		}
	}

	let atom = match atom {
		Some(a) if a.blocker.is_none() && a.use_deps.is_empty() && a.slot_operator.is_none() => a,
		_ => return Err(MatchError::PackageInvalid(format!("invalid package spec: {}", spec))),
	};
	if stablereq && (atom.operator != Some(AtomOperator::Equal) || atom.glob || atom.slot.is_some()) {
		return Err(MatchError::PackageInvalid(format!("disallowed package spec (only = allowed): {}", atom)));
	}

	let keywords = tokens.map(|k| k.trim_start_matches('~').to_string()).collect();
	Ok(Some(PackageLine { spec, token: first.to_string(), atom, keywords }))
}
