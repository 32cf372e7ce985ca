//! Keywording and stabilization bugs as seen by the rest of the crate.

pub mod bugzilla;
pub use bugzilla::Bugzilla;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BugCategory {
	/// Request to add `~arch` keywords.
	KeywordReq,
	/// Request to stabilize `~arch` keywords.
	StableReq,
}

impl BugCategory {
	pub fn name(&self) -> &'static str {
		match self {
			Self::KeywordReq => "KEYWORDREQ",
			Self::StableReq => "STABLEREQ",
		}
	}

	/// Tracker component used for bugs of this category.
	pub fn component(&self) -> &'static str {
		match self {
			Self::KeywordReq => "Keywording",
			Self::StableReq => "Stabilization",
		}
	}

	pub fn from_component(component: &str) -> Option<Self> {
		match component {
			"Keywording" => Some(Self::KeywordReq),
			"Stabilization" => Some(Self::StableReq),
			_ => None,
		}
	}
}

impl Display for BugCategory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugRecord {
	pub id: u64,
	pub category: Option<BugCategory>,
	/// The package list text.
	pub atoms: String,
	pub cc: Vec<String>,
	pub depends: Vec<u64>,
	pub blocks: Vec<u64>,
	/// `None` while unset.
	pub sanity_check: Option<bool>,
	/// Filed in the security product.
	pub security: bool,
	pub resolved: bool,
	/// Tracker keywords, e.g. `CC-ARCHES` or `ALLARCHES`.
	pub keywords: Vec<String>,
	pub assigned_to: String,
	pub last_change_time: DateTime<Utc>,
}

impl BugRecord {
	pub fn new(id: u64, category: Option<BugCategory>, atoms: impl Into<String>) -> Self {
		Self {
			id,
			category,
			atoms: atoms.into(),
			cc: Vec::new(),
			depends: Vec::new(),
			blocks: Vec::new(),
			sanity_check: None,
			security: false,
			resolved: false,
			keywords: Vec::new(),
			assigned_to: String::new(),
			last_change_time: DateTime::<Utc>::MIN_UTC,
		}
	}

	pub fn has_keyword(&self, keyword: &str) -> bool {
		self.keywords.iter().any(|k| k == keyword)
	}

	pub fn is_stablereq(&self) -> bool {
		self.category == Some(BugCategory::StableReq)
	}
}

/// Arches CC-ed on a bug, sorted.
/// 
/// Both `arch@gentoo.org` addresses and bare arch names are recognised.
pub fn arches_from_cc<'a>(cc: impl IntoIterator<Item = &'a String>, known_arches: &[String]) -> Vec<String> {
	let mut out = BTreeSet::new();
	for c in cc {
		let name = match c.split_once('@') {
			Some((name, "gentoo.org")) => name,
			Some(_) => continue,
			None => c.as_str(),
		};
		if known_arches.iter().any(|a| a == name) {
			out.insert(name.to_string());
		}
	}
	out.into_iter().collect()
}

/// Splits the dependencies of bug `id` into dependencies of the same category and the rest.
/// 
/// Same-category dependencies are followed transitively, any other dependency
/// ends its branch. Resolved bugs are skipped, unfetched bugs count as other.
/// Both lists are sorted.
pub fn split_dependent_bugs(bugs: &BTreeMap<u64, BugRecord>, id: u64) -> (Vec<u64>, Vec<u64>) {
	let Some(bug) = bugs.get(&id) else {
		return (Vec::new(), Vec::new());
	};
	let mut same = BTreeSet::new();
	let mut other = BTreeSet::new();
	let mut seen = BTreeSet::from([id]);
	let mut queue: VecDeque<u64> = bug.depends.iter().copied().collect();

	while let Some(dep) = queue.pop_front() {
		if !seen.insert(dep) {
			continue;
		}
		match bugs.get(&dep) {
			None => { other.insert(dep); },
			Some(d) if d.resolved => {},
			Some(d) if d.category.is_some() && d.category == bug.category => {
				same.insert(dep);
				queue.extend(d.depends.iter().copied());
			},
			Some(_) => { other.insert(dep); },
		}
	}

	(same.into_iter().collect(), other.into_iter().collect())
}

/// Search criteria for [`BugTracker::find_bugs`].
#[derive(Debug, Clone, Default)]
pub struct BugQuery {
	/// Explicit bug numbers, other criteria still apply.
	pub bugs: Vec<u64>,
	pub categories: Vec<BugCategory>,
	/// Require all of these addresses in CC.
	pub cc: Vec<String>,
	/// Skip bugs carrying any of these personal tags.
	pub skip_tags: Vec<String>,
	pub unresolved: bool,
	/// Accepted sanity-check states, empty for any.
	pub sanity_check: Vec<bool>,
}

/// A status change for a bug, see [`BugTracker::update_status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BugUpdate {
	/// New sanity-check state, `None` resets it.
	pub sanity_check: Option<bool>,
	pub comment: Option<String>,
	pub cc_add: Vec<String>,
	pub keywords_add: Vec<String>,
	pub keywords_remove: Vec<String>,
	/// Replacement package list text.
	pub new_package_list: Option<String>,
}

/// The bug tracker.
pub trait BugTracker {
	/// Fetches bugs matching `query`.
	fn find_bugs(&self, query: &BugQuery) -> crate::Result<BTreeMap<u64, BugRecord>>;

	/// Fetches specific bugs.
	fn fetch_bugs(&self, ids: &[u64]) -> crate::Result<BTreeMap<u64, BugRecord>> {
		self.find_bugs(&BugQuery { bugs: ids.to_vec(), ..Default::default() })
	}

	/// Latest comment made by the account in use, if any.
	fn latest_own_comment(&self, id: u64) -> crate::Result<Option<String>>;

	/// Updates the sanity-check flag along with any side changes.
	/// 
	/// Previous comments by the same account are marked obsolete when a new one is posted.
	fn update_status(&self, id: u64, update: &BugUpdate) -> crate::Result<()>;

	/// Removes `uncc` from CC, posts `comment` and optionally closes the bug.
	fn resolve_bug(&self, id: u64, uncc: &[String], comment: &str, close: bool) -> crate::Result<()>;

	/// Fetches dependencies of `bugs` that are missing, recursively.
	fn resolve_dependencies(&self, mut bugs: BTreeMap<u64, BugRecord>) -> crate::Result<BTreeMap<u64, BugRecord>> {
		loop {
			let missing: BTreeSet<u64> = bugs.values()
				.flat_map(|b| b.depends.iter())
				.filter(|d| !bugs.contains_key(d))
				.copied()
				.collect();
			if missing.is_empty() {
				return Ok(bugs);
			}
			let missing: Vec<u64> = missing.into_iter().collect();
			log::debug!("Fetching dependency bugs: {:?}", missing);
			let fetched = self.fetch_bugs(&missing)?;
			if fetched.is_empty() {
				log::warn!("Unable to fetch dependency bugs: {:?}", missing);
				return Ok(bugs);
			}
			bugs.extend(fetched);
		}
	}
}
