//! Writing `*` and `^` out as the keywords they stand for.

use regex::Regex;

use crate::bug::BugRecord;
use crate::keyword::sorted_keywords;
use crate::repository::{Atom, Repository, select_best_version};
use super::{MatchError, suggested_keywords};

/// Splits `line` into words and the whitespace between them, keeping both.
/// 
/// Words end up at even indices, the first and last may be empty.
fn split_keep_whitespace(line: &str) -> Vec<&str> {
	let re = Regex::new(r"\s+").expect("static regex");
	let mut out = Vec::new();
	let mut last = 0;
	for m in re.find_iter(line) {
		out.push(&line[last..m.start()]);
		out.push(m.as_str());
		last = m.end();
	}
	out.push(&line[last..]);
	out
}

/// Returns the package list of `bug` with `*` and `^` replaced.
/// 
/// Layout, comments and everything else are kept as they are. A `*` with
/// nothing to suggest becomes `-`. Fails with `ExpandImpossible` when `^` refers
/// to an empty line but other keywords are given next to it.
/// 
/// The list is expected to have matched successfully before.
pub fn expand_package_list(repo: &dyn Repository, bug: &BugRecord) -> crate::Result<Result<String, MatchError>> {
	let impossible = || Ok(Err(MatchError::ExpandImpossible("keywords along with empty ^".to_string())));
	let mut out = String::new();
	let mut prev_keywords: Option<Vec<String>> = None;

	for line in bug.atoms.split_inclusive('\n') {
		let words = split_keep_whitespace(line);
		let mut pkg = None;
		let mut current: Option<Vec<String>> = None;
		let mut had_empty_above = false;

		for (i, &w) in words.iter().enumerate() {
			if w.starts_with('#') {
				out.extend(words[i..].iter().copied());
				break;
			}

			let mut w = w.to_string();
			if !w.trim().is_empty() && pkg.is_none() {
				let atom = Atom::parse(&format!("={}", w)).or_else(|_| Atom::parse(&w))
					.map_err(|_| crate::Error::Parse(format!("invalid package spec: {}", w)))?;
				let matches = repo.match_atom(&atom)?;
				let best = select_best_version(&matches)
					.ok_or_else(|| crate::Error::PackageNotFound(atom.to_string()))?;
				pkg = Some(best.clone());
				current = Some(Vec::new());
			} else if w == "*" {
				if let Some(p) = &pkg {
					let suggested = suggested_keywords(repo, p, bug.is_stablereq())?;
					w = if suggested.is_empty() { "-".to_string() } else { sorted_keywords(&suggested).join(" ") };
				}
			} else if w == "^" {
				let prev = prev_keywords.clone().unwrap_or_default();
				if prev.is_empty() {
					if current.as_ref().map_or(0, |c| c.len()) > 1 {
						return impossible();
					}
					had_empty_above = true;
				}
				w = prev.join(" ");
			}

			if let Some(current) = current.as_mut() {
				if !w.trim().is_empty() {
					if had_empty_above {
						return impossible();
					}
					current.push(w.clone());
				}
			}
			out.push_str(&w);
		}

		/* the first entry is the package itself */
		if let Some(current) = current {
			prev_keywords = Some(current.into_iter().skip(1).collect());
		}
	}

	Ok(Ok(out))
}
