//! Turning a bug's package list into concrete packages and keywords.
//! 
//! Each non-empty line holds an atom followed by keywords:
//! - no keywords: use the arches CC-ed on the bug,
//! - `*`: the suggested keywords for the package,
//! - `^`: the keywords of the previous line,
//! - `-`: skip the line.

pub mod parse;
pub mod suggest;
pub mod expand;

pub use suggest::suggested_keywords;
pub use expand::expand_package_list;

use std::collections::{BTreeMap, BTreeSet};

use crate::bug::{arches_from_cc, BugRecord};
use crate::keyword::sorted_keywords;
use crate::repository::{Atom, PackageCandidate, Repository, select_best_version};

/// Why a package list could not be turned into packages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
	/// Syntactically broken or disallowed atom.
	#[error("{0}")]
	PackageInvalid(String),
	/// A listed package can not be used for the requested arches.
	#[error("{0}")]
	PackageMasked(String),
	/// The atom matches nothing in the repository.
	#[error("{0}")]
	PackageNoMatch(String),
	/// Unknown arch, or `^` with nothing before it.
	#[error("{0}")]
	KeywordNoMatch(String),
	/// Some packages have no keywords and no arches are CC-ed.
	#[error("incomplete keywords for packages: {}", .0.join(" "))]
	KeywordNotSpecified(Vec<String>),
	/// No keywords given and none could be suggested either, the bug is most likely done.
	#[error("package keywords in line with other versions and none specified")]
	KeywordNoneLeft,
	#[error("{0}")]
	PackageListEmpty(String),
	/// Every listed package already has the requested keywords.
	#[error("all packages keyworded already")]
	PackageListDoneAlready,
	/// A same-category dependency bug failed to match.
	#[error("{0}")]
	DependentBug(String),
	/// `*` or `^` can not be written out without changing the meaning of the list.
	#[error("{0}")]
	ExpandImpossible(String),
}

impl MatchError {
	/// The list is empty, either plainly or because the work is done.
	pub fn is_empty_list(&self) -> bool {
		matches!(self, Self::PackageListEmpty(_) | Self::PackageListDoneAlready)
	}

	pub fn is_incomplete_keywords(&self) -> bool {
		matches!(self, Self::KeywordNotSpecified(_) | Self::KeywordNoneLeft)
	}
}

/// Packages with the keywords requested for them, in list order.
/// 
/// Each package appears once, inserting it again replaces its keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageList {
	entries: Vec<(PackageCandidate, Vec<String>)>,
}

/// Order independent summary of a package list, `cpv -> sorted keywords`.
pub type PackageListFingerprint = BTreeMap<String, Vec<String>>;

impl PackageList {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn insert(&mut self, pkg: PackageCandidate, keywords: Vec<String>) {
		match self.entries.iter_mut().find(|(p, _)| *p == pkg) {
			Some(e) => e.1 = keywords,
			None => self.entries.push((pkg, keywords)),
		}
	}

	pub fn get(&self, pkg: &PackageCandidate) -> Option<&Vec<String>> {
		self.entries.iter().find(|(p, _)| p == pkg).map(|(_, k)| k)
	}

	pub fn iter(&self) -> impl Iterator<Item = &(PackageCandidate, Vec<String>)> {
		self.entries.iter()
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (PackageCandidate, Vec<String>)> {
		self.entries.iter_mut()
	}

	pub fn packages(&self) -> impl Iterator<Item = &PackageCandidate> {
		self.entries.iter().map(|(p, _)| p)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Union of all keywords in the list.
	pub fn all_keywords(&self) -> BTreeSet<String> {
		self.entries.iter().flat_map(|(_, k)| k.iter().cloned()).collect()
	}

	/// Merges `other` into this list.
	/// 
	/// A stable keyword replaces the matching `~arch` one.
	pub fn merge(&mut self, other: &PackageList) {
		for (pkg, keywords) in other.iter() {
			let idx = match self.entries.iter().position(|(p, _)| p == pkg) {
				Some(i) => i,
				None => {
					self.entries.push((pkg.clone(), Vec::new()));
					self.entries.len() - 1
				},
			};
			let current = &mut self.entries[idx].1;
			for k in keywords {
				let testing = format!("~{}", k);
				current.retain(|c| *c != testing);
				if !current.contains(k) {
					current.push(k.clone());
				}
			}
		}
	}

	pub fn fingerprint(&self) -> PackageListFingerprint {
		self.entries.iter()
			.map(|(p, k)| (p.cpv(), sorted_keywords(k)))
			.collect()
	}
}

impl FromIterator<(PackageCandidate, Vec<String>)> for PackageList {
	fn from_iter<T: IntoIterator<Item = (PackageCandidate, Vec<String>)>>(iter: T) -> Self {
		let mut list = PackageList::new();
		for (p, k) in iter {
			list.insert(p, k);
		}
		list
	}
}

/// Knobs for [`match_package_list`].
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
	/// Drop keywords the package already has.
	pub only_new: bool,
	/// Keep only these arches, empty keeps everything.
	pub filter_arch: Vec<String>,
	/// For ALLARCHES stabilization requests, add every suggested arch back after filtering.
	pub permit_allarches: bool,
}

/// Everything learned from a package list before deciding on the outcome.
#[derive(Debug, Clone, Default)]
pub struct PackageListScan {
	/// Packages in list order, including ones with no keywords.
	pub packages: PackageList,
	/// Lines without keywords that could have some.
	pub no_keywords: Vec<String>,
	/// Lines without keywords and nothing to suggest.
	pub no_potential_keywords: Vec<String>,
	/// A package survived with keywords.
	pub yielded: bool,
	/// A package was dropped by the arch filter.
	pub filtered: bool,
	/// A package was dropped because it had everything already.
	pub keyworded_already: bool,
}

impl PackageListScan {
	/// Decides the outcome once the whole list was seen.
	/// 
	/// Missing keywords outrank an empty list. Missing keywords are only
	/// reported as `KeywordNoneLeft` when nothing else in the list needs work.
	pub fn verdict(&self) -> Result<(), MatchError> {
		if !self.no_keywords.is_empty() {
			return Err(MatchError::KeywordNotSpecified(self.no_keywords.clone()));
		}
		if !self.no_potential_keywords.is_empty() {
			return Err(if self.yielded {
				MatchError::KeywordNotSpecified(self.no_potential_keywords.clone())
			} else {
				MatchError::KeywordNoneLeft
			});
		}
		if !self.yielded {
			return Err(if self.filtered {
				MatchError::PackageListEmpty("no packages match requested arch".to_string())
			} else if self.keyworded_already {
				MatchError::PackageListDoneAlready
			} else {
				MatchError::PackageListEmpty("empty package list".to_string())
			});
		}
		Ok(())
	}

	pub fn into_result(self) -> Result<PackageList, MatchError> {
		self.verdict()?;
		Ok(self.packages)
	}
}

/// Walks the package list of `bug` line by line.
/// 
/// Errors tied to a single line (bad atom, no match, unknown keyword) are
/// returned straight away, everything else is left to [`PackageListScan::verdict`].
/// The outer `Result` carries repository failures.
pub fn scan_package_list(repo: &dyn Repository, bug: &BugRecord, options: &MatchOptions) -> crate::Result<Result<PackageListScan, MatchError>> {
	let stablereq = bug.is_stablereq();
	let known_arches = repo.known_arches();
	let cc_arches = arches_from_cc(&bug.cc, known_arches);
	let allarches_requested = options.permit_allarches && stablereq && bug.has_keyword("ALLARCHES");

	let mut scan = PackageListScan::default();
	let mut prev_keywords: Option<Vec<String>> = None;

	for line in bug.atoms.lines() {
		let pl = match parse::parse_line(line, stablereq) {
			Ok(Some(pl)) => pl,
			Ok(None) => continue,
			Err(e) => return Ok(Err(e)),
		};

		let matches = repo.match_atom(&pl.atom)?;
		let pkg = if stablereq { matches.iter().max() } else { select_best_version(&matches) };
		let Some(pkg) = pkg.cloned() else {
			return Ok(Err(MatchError::PackageNoMatch(format!("no match for package: {}", pl.token))));
		};

		let mut keywords = pl.keywords;
		if keywords.iter().any(|k| k == "-") {
			continue;
		}
		if keywords.iter().any(|k| k == "*") {
			let suggested = suggested_keywords(repo, &pkg, stablereq)?;
			let mut expanded = sorted_keywords(&suggested);
			expanded.extend(keywords.into_iter().filter(|k| k != "*"));
			keywords = expanded;
		}
		if keywords.iter().any(|k| k == "^") {
			let Some(prev) = &prev_keywords else {
				return Ok(Err(MatchError::KeywordNoMatch("invalid use of ^ keyword on first line".to_string())));
			};
			let mut expanded = prev.clone();
			expanded.extend(keywords.into_iter().filter(|k| k != "^"));
			keywords = expanded;
		}

		let unknown: BTreeSet<&String> = keywords.iter().filter(|k| !repo.is_known_arch(k)).collect();
		if !unknown.is_empty() {
			let unknown: Vec<&str> = unknown.into_iter().map(|k| k.as_str()).collect();
			return Ok(Err(MatchError::KeywordNoMatch(format!("incorrect keywords: {}", unknown.join(" ")))));
		}

		if keywords.is_empty() {
			keywords = cc_arches.clone();
		} else if !cc_arches.is_empty() {
			keywords.retain(|k| cc_arches.contains(k));
			/* no longer relevant to the arches CC-ed */
			if keywords.is_empty() {
				scan.filtered = true;
				continue;
			}
		}

		if keywords.is_empty() {
			if suggested_keywords(repo, &pkg, stablereq)?.is_empty() {
				scan.no_potential_keywords.push(pl.spec);
			} else {
				scan.no_keywords.push(pl.spec);
			}
			scan.packages.insert(pkg, keywords);
			continue;
		}
		prev_keywords = Some(keywords.clone());

		let allarches_keywords = if allarches_requested {
			suggested_keywords(repo, &pkg, true)?
		} else {
			BTreeSet::new()
		};

		if options.only_new {
			keywords.retain(|k| !pkg.has_keyword(k) && (stablereq || !pkg.has_keyword(&format!("~{}", k))));
			if keywords.is_empty() {
				scan.keyworded_already = true;
				continue;
			}
		}

		if !options.filter_arch.is_empty() {
			keywords.retain(|k| options.filter_arch.contains(k));
			for k in allarches_keywords {
				if !keywords.contains(&k) {
					keywords.push(k);
				}
			}
			if keywords.is_empty() {
				scan.filtered = true;
				continue;
			}
		}

		scan.packages.insert(pkg, keywords);
		scan.yielded = true;
	}

	Ok(Ok(scan))
}

/// Matches the package list of `bug`, see [`scan_package_list`].
pub fn match_package_list(repo: &dyn Repository, bug: &BugRecord, options: &MatchOptions) -> crate::Result<Result<PackageList, MatchError>> {
	Ok(scan_package_list(repo, bug, options)?.and_then(|s| s.into_result()))
}

/// Whether `pkg` is marked for ALLARCHES stabilization in its `metadata.xml`.
pub fn is_allarches(pkg: &PackageCandidate) -> Result<bool, MatchError> {
	for restrict in &pkg.metadata.stabilize_allarches {
		let Some(r) = restrict else {
			return Ok(true);
		};
		let atom = Atom::parse(r)
			.map_err(|_| MatchError::PackageInvalid(format!("invalid restrict: {} (in {})", r, pkg.cpv())))?;
		if atom.key() != pkg.key() {
			return Err(MatchError::PackageInvalid(format!("restrict refers to wrong package: {} (in {})", r, pkg.cpv())));
		}
		if atom.matches(pkg) {
			return Ok(true);
		}
	}
	Ok(false)
}

/// Whether every package already has a stable version on each of its requested arches.
pub fn can_allarches_for_keywords(repo: &dyn Repository, list: &PackageList) -> crate::Result<bool> {
	for (pkg, keywords) in list.iter() {
		let mut left: BTreeSet<&String> = keywords.iter().collect();
		for p in repo.package_versions(&pkg.key())? {
			left.retain(|k| !p.has_keyword(k));
		}
		if !left.is_empty() {
			return Ok(false);
		}
	}
	Ok(true)
}

#[cfg(test)]
mod test {
	use super::*;

	fn scan() -> PackageListScan {
		PackageListScan::default()
	}

	#[test]
	fn missing_outranks_empty() {
		let s = PackageListScan { no_keywords: vec!["=a/b-1".into()], filtered: true, ..scan() };
		assert_eq!(s.verdict(), Err(MatchError::KeywordNotSpecified(vec!["=a/b-1".into()])));
	}
	#[test]
	fn none_left_alone() {
		let s = PackageListScan { no_potential_keywords: vec!["=a/b-1".into()], ..scan() };
		assert_eq!(s.verdict(), Err(MatchError::KeywordNoneLeft));
	}
	#[test]
	fn none_left_with_others() {
		let s = PackageListScan { no_potential_keywords: vec!["=a/b-1".into()], yielded: true, ..scan() };
		assert_eq!(s.verdict(), Err(MatchError::KeywordNotSpecified(vec!["=a/b-1".into()])));
	}
	#[test]
	fn filtered_outranks_done() {
		let s = PackageListScan { filtered: true, keyworded_already: true, ..scan() };
		assert!(matches!(s.verdict(), Err(MatchError::PackageListEmpty(_))));
	}
	#[test]
	fn done_already() { assert_eq!(PackageListScan { keyworded_already: true, ..scan() }.verdict(), Err(MatchError::PackageListDoneAlready)); }
	#[test]
	fn empty() { assert_eq!(scan().verdict(), Err(MatchError::PackageListEmpty("empty package list".into()))); }
	#[test]
	fn yielded_ok() { assert_eq!(PackageListScan { yielded: true, keyworded_already: true, ..scan() }.verdict(), Ok(())); }
	#[test]
	fn subtypes() {
		assert!(MatchError::PackageListDoneAlready.is_empty_list());
		assert!(MatchError::KeywordNoneLeft.is_incomplete_keywords());
		assert!(!MatchError::PackageNoMatch(String::new()).is_empty_list());
	}
	fn candidate(ver: &str) -> PackageCandidate {
		PackageCandidate::new("test", "foo", crate::repository::PackageVersion::new(ver).unwrap())
	}
	fn kw(s: &str) -> Vec<String> {
		s.split_whitespace().map(|s| s.to_string()).collect()
	}

	#[test]
	fn merge_stable_replaces_testing() {
		let mut list: PackageList = [(candidate("1"), kw("~amd64 hppa"))].into_iter().collect();
		list.merge(&[(candidate("1"), kw("amd64"))].into_iter().collect());
		assert_eq!(list.get(&candidate("1")), Some(&kw("hppa amd64")));
	}
	#[test]
	fn merge_adds_packages() {
		let mut list: PackageList = [(candidate("1"), kw("x86"))].into_iter().collect();
		list.merge(&[(candidate("2"), kw("hppa"))].into_iter().collect());
		assert_eq!(list.len(), 2);
	}
	#[test]
	fn fingerprint_ignores_order() {
		let a: PackageList = [(candidate("1"), kw("x86 amd64")), (candidate("2"), kw("hppa"))].into_iter().collect();
		let b: PackageList = [(candidate("2"), kw("hppa")), (candidate("1"), kw("amd64 x86"))].into_iter().collect();
		assert_eq!(a.fingerprint(), b.fingerprint());
	}
	#[test]
	fn not_specified_message() { assert_eq!(MatchError::KeywordNotSpecified(vec!["a".into(), "b".into()]).to_string(), "incomplete keywords for packages: a b"); }
}
