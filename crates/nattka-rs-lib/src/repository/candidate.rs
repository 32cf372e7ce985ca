//! A single package version available in a repository.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use super::depend::{DepNode, DepType};
use super::version::PackageVersion;

/// Package-level data shared by all versions, read from `metadata.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
	pub maintainers: Vec<String>,
	/// One entry per `<stabilize-allarches/>` element, holding its `restrict` atom if any.
	pub stabilize_allarches: Vec<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct PackageCandidate {
	pub category: String,
	pub package: String,
	pub version: PackageVersion,
	pub eapi: String,
	pub slot: String,
	subslot: Option<String>,
	pub keywords: Vec<String>,
	pub properties: Vec<String>,
	pub dependencies: BTreeMap<DepType, Vec<DepNode>>,
	/// Ebuild location, `None` for packages that only exist in memory.
	pub path: Option<PathBuf>,
	pub metadata: Arc<PackageMetadata>,
}

impl PackageCandidate {
	pub fn new(category: impl Into<String>, package: impl Into<String>, version: PackageVersion) -> Self {
		Self {
			category: category.into(),
			package: package.into(),
			version,
			eapi: "0".to_string(),
			slot: "0".to_string(),
			subslot: None,
			keywords: Vec::new(),
			properties: Vec::new(),
			dependencies: BTreeMap::new(),
			path: None,
			metadata: Default::default(),
		}
	}

	/// `category/package`
	pub fn key(&self) -> String {
		format!("{}/{}", self.category, self.package)
	}

	/// `category/package-version`
	pub fn cpv(&self) -> String {
		format!("{}/{}-{}", self.category, self.package, self.version)
	}

	/// `=category/package-version`, the atom matching exactly this version.
	pub fn versioned_atom(&self) -> String {
		format!("={}", self.cpv())
	}

	/// Sub-slot, defaulting to the slot.
	pub fn subslot(&self) -> &str {
		self.subslot.as_deref().unwrap_or(&self.slot)
	}

	/// Sets `SLOT` from its `slot/subslot` form.
	pub fn set_slot(&mut self, slot: &str) {
		match slot.split_once('/') {
			Some((s, sub)) => {
				self.slot = s.to_string();
				self.subslot = Some(sub.to_string());
			},
			None => {
				self.slot = slot.to_string();
				self.subslot = None;
			},
		}
	}

	pub fn is_live(&self) -> bool {
		self.properties.iter().any(|p| p == "live")
	}

	pub fn dependencies(&self, dep_type: DepType) -> &[DepNode] {
		self.dependencies.get(&dep_type).map(|d| d.as_slice()).unwrap_or_default()
	}

	pub fn has_keyword(&self, keyword: &str) -> bool {
		self.keywords.iter().any(|k| k == keyword)
	}

	/// Requested arches that this version's own `KEYWORDS` mask (`-arch` or `-*`).
	/// 
	/// Returned as sorted `-arch` entries.
	pub fn keyword_masked<'a>(&self, arches: impl IntoIterator<Item = &'a String>) -> Vec<String> {
		let arches: Vec<&String> = arches.into_iter().collect();
		let mut masked: std::collections::BTreeSet<String> = Default::default();
		for k in &self.keywords {
			if k == "-*" {
				masked = arches.iter().map(|a| a.to_string()).collect();
			} else if let Some(a) = k.strip_prefix('-') {
				masked.insert(a.to_string());
			} else {
				masked.remove(k.trim_start_matches('~'));
			}
		}
		masked.into_iter()
			.filter(|m| arches.iter().any(|a| *a == m))
			.map(|m| format!("-{}", m))
			.collect()
	}
}

/// Picks the version to act on from versions matching an unversioned request.
/// 
/// The newest version with any keywords wins, then the newest non-live one,
/// then simply the newest.
pub fn select_best_version(matches: &[PackageCandidate]) -> Option<&PackageCandidate> {
	let mut sorted: Vec<&PackageCandidate> = matches.iter().collect();
	sorted.sort();
	sorted.iter().rev().find(|m| !m.keywords.is_empty())
		.or_else(|| sorted.iter().rev().find(|m| !m.is_live()))
		.or_else(|| sorted.last())
		.copied()
}

impl PartialEq for PackageCandidate {
	fn eq(&self, other: &Self) -> bool {
		self.category == other.category && self.package == other.package && self.version.as_str() == other.version.as_str()
	}
}

impl Eq for PackageCandidate {}

impl Ord for PackageCandidate {
	fn cmp(&self, other: &Self) -> Ordering {
		self.category.cmp(&other.category)
			.then_with(|| self.package.cmp(&other.package))
			.then_with(|| self.version.cmp(&other.version))
			.then_with(|| self.version.as_str().cmp(other.version.as_str()))
	}
}

impl PartialOrd for PackageCandidate {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl std::hash::Hash for PackageCandidate {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.category.hash(state);
		self.package.hash(state);
		self.version.as_str().hash(state);
	}
}

impl Display for PackageCandidate {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.cpv())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn pkg(ver: &str, keywords: &str, live: bool) -> PackageCandidate {
		let mut p = PackageCandidate::new("test", "foo", PackageVersion::new(ver).unwrap());
		p.keywords = keywords.split_whitespace().map(|s| s.to_string()).collect();
		if live {
			p.properties.push("live".into());
		}
		p
	}

	#[test]
	fn best_is_newest_keyworded() {
		let v = [pkg("1", "~amd64", false), pkg("2", "~amd64", false), pkg("3", "", false)];
		assert_eq!(select_best_version(&v).unwrap().version.as_str(), "2");
	}
	#[test]
	fn best_skips_live() {
		let v = [pkg("9999", "", true), pkg("10", "", false), pkg("20", "", false)];
		assert_eq!(select_best_version(&v).unwrap().version.as_str(), "20");
	}
	#[test]
	fn best_live_only() {
		let v = [pkg("9999", "", true), pkg("9998", "", true)];
		assert_eq!(select_best_version(&v).unwrap().version.as_str(), "9999");
	}
	#[test]
	fn best_none() { assert!(select_best_version(&[]).is_none()); }
	#[test]
	fn slot_split() {
		let mut p = pkg("1", "", false);
		p.set_slot("2/2.1");
		assert_eq!((p.slot.as_str(), p.subslot()), ("2", "2.1"));
	}
	#[test]
	fn keyword_mask_star() {
		let p = pkg("1", "-* ~amd64", false);
		assert_eq!(p.keyword_masked(&["amd64".to_string(), "x86".to_string()]), vec!["-x86"]);
	}
	#[test]
	fn keyword_mask_single() { assert_eq!(pkg("1", "-hppa amd64", false).keyword_masked(&["hppa".to_string()]), vec!["-hppa"]); }
	#[test]
	fn keyword_mask_none() { assert!(pkg("1", "~amd64", false).keyword_masked(&["x86".to_string()]).is_empty()); }
}
