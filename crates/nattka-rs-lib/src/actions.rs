//! The commands besides the sanity check.

pub mod apply;
pub mod commit;
pub mod resolve;
pub mod make_package_list;

pub use apply::{apply_bugs, ApplyOptions};
pub use commit::{commit_bugs, CommitOptions};
pub use resolve::{resolve_bugs, ResolveOptions};
pub use make_package_list::{make_package_list, MakePackageListOptions};

use std::collections::BTreeMap;

use crate::bug::{BugCategory, BugQuery, BugRecord, BugTracker};

/// Which bugs a command works on.
#[derive(Debug, Clone, Default)]
pub struct BugSelection {
	/// Explicit bug numbers, processed in this order.
	pub bugs: Vec<u64>,
	/// Restrict to these categories, empty for both.
	pub categories: Vec<BugCategory>,
	/// Only bugs that are security bugs or carry the `SECURITY` keyword.
	pub security: bool,
	pub fetch_dependencies: bool,
	/// Only bugs with all of these addresses CC-ed.
	pub cc: Vec<String>,
}

/// Fetches the selected bugs.
/// 
/// Returns the order to process them in, explicit bugs as given and
/// otherwise newest first, along with all fetched bugs.
pub fn find_bugs(tracker: &dyn BugTracker, selection: &BugSelection) -> crate::Result<(Vec<u64>, BTreeMap<u64, BugRecord>)> {
	let explicit = !selection.bugs.is_empty();
	let mut query = if explicit {
		BugQuery { bugs: selection.bugs.clone(), ..Default::default() }
	} else {
		BugQuery {
			categories: vec![BugCategory::KeywordReq, BugCategory::StableReq],
			skip_tags: vec!["nattka:skip".to_string()],
			unresolved: true,
			..Default::default()
		}
	};
	if !selection.categories.is_empty() {
		query.categories = selection.categories.clone();
	}
	query.cc = selection.cc.clone();

	let mut bugs = tracker.find_bugs(&query)?;
	/* a bug closed while searching may still be returned */
	if !explicit {
		bugs.retain(|_, b| !b.resolved);
	}
	if selection.security {
		bugs.retain(|_, b| b.security || b.has_keyword("SECURITY"));
	}

	let order: Vec<u64> = if explicit {
		selection.bugs.iter().copied().filter(|b| bugs.contains_key(b)).collect()
	} else {
		bugs.keys().rev().copied().collect()
	};
	log::info!("Found {} bugs", order.len());

	if selection.fetch_dependencies {
		bugs = tracker.resolve_dependencies(bugs)?;
	}
	Ok((order, bugs))
}

/// Resolves arch arguments, which may use shell-style wildcards, to known arches.
/// 
/// Without patterns `default` is used.
pub fn select_arches(known_arches: &[String], patterns: &[String], default: Option<&str>) -> crate::Result<Vec<String>> {
	if patterns.is_empty() {
		return match default {
			Some(a) if known_arches.iter().any(|k| k == a) => Ok(vec![a.to_string()]),
			Some(a) => Err(crate::Error::Config(format!("default arch {:?} is not a known arch", a))),
			None => Err(crate::Error::Config("no arch specified and no default arch set".to_string())),
		};
	}

	let mut out = Vec::new();
	for p in patterns {
		let glob = globset::Glob::new(p)
			.map_err(|e| crate::Error::Config(format!("invalid arch pattern {:?}: {}", p, e)))?
			.compile_matcher();
		let matched: Vec<&String> = known_arches.iter().filter(|a| glob.is_match(a.as_str())).collect();
		if matched.is_empty() {
			return Err(crate::Error::Config(format!("{:?} does not match any known arches", p)));
		}
		out.extend(matched.into_iter().cloned());
	}
	Ok(out)
}

#[cfg(test)]
mod test {
	use super::*;

	fn known() -> Vec<String> {
		["alpha", "amd64", "amd64-linux", "arm64", "hppa", "x86"].iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn plain_arch() { assert_eq!(select_arches(&known(), &["hppa".into()], None).unwrap(), vec!["hppa"]); }
	#[test]
	fn wildcard() { assert_eq!(select_arches(&known(), &["a*".into()], None).unwrap(), vec!["alpha", "amd64", "amd64-linux", "arm64"]); }
	#[test]
	fn question_mark() { assert_eq!(select_arches(&known(), &["x8?".into()], None).unwrap(), vec!["x86"]); }
	#[test]
	fn class() { assert_eq!(select_arches(&known(), &["[ah]*4".into()], None).unwrap(), vec!["amd64", "arm64"]); }
	#[test]
	fn negated_class() { assert_eq!(select_arches(&known(), &["[!a]*".into()], None).unwrap(), vec!["hppa", "x86"]); }
	#[test]
	fn literal_bracket_class() { assert!(matches!(select_arches(&known(), &["[]]".into()], None), Err(crate::Error::Config(e)) if e.contains("does not match"))); }
	#[test]
	fn no_match() { assert!(select_arches(&known(), &["sparc".into()], None).is_err()); }
	#[test]
	fn dot_is_literal() { assert!(select_arches(&known(), &["x.6".into()], None).is_err()); }
	#[test]
	fn default_arch() { assert_eq!(select_arches(&known(), &[], Some("amd64")).unwrap(), vec!["amd64"]); }
	#[test]
	fn unknown_default() { assert!(select_arches(&known(), &[], Some("sparc")).is_err() && select_arches(&known(), &[], None).is_err()); }
}
