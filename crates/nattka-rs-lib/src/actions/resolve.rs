//! Un-CC-ing arches that are done and closing finished bugs.

use std::collections::{BTreeMap, BTreeSet};

use crate::bug::{arches_from_cc, BugRecord, BugTracker};

#[derive(Debug, Clone)]
pub struct ResolveOptions {
	pub arches: Vec<String>,
	pub ignore_allarches: bool,
	/// Never close bugs.
	pub no_resolve: bool,
	/// Only log what would be done.
	pub pretend: bool,
	pub arch_cc_domain: String,
}

impl Default for ResolveOptions {
	fn default() -> Self {
		Self {
			arches: Vec::new(),
			ignore_allarches: false,
			no_resolve: false,
			pretend: false,
			arch_cc_domain: "gentoo.org".to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
	/// Arches to remove from CC, sorted.
	pub arches: Vec<String>,
	pub allarches: bool,
	/// No arches are left after this.
	pub all_done: bool,
	pub close: bool,
}

impl Resolution {
	pub fn comment(&self) -> String {
		let mut comment = format!("{} {}done", self.arches.join(" "), if self.allarches { "(ALLARCHES) " } else { "" });
		if self.all_done {
			comment.push_str("\n\nall arches done");
		}
		comment
	}
}

/// Works out what resolving `bug` for `options.arches` means.
/// 
/// Returns `None` when none of the arches are CC-ed.
pub fn plan_resolution(bug: &BugRecord, known_arches: &[String], options: &ResolveOptions) -> Option<Resolution> {
	let current: BTreeSet<String> = arches_from_cc(&bug.cc, known_arches).into_iter().collect();
	let allarches = !options.ignore_allarches && bug.has_keyword("ALLARCHES");
	let to_remove: BTreeSet<String> = if allarches {
		current.clone()
	} else {
		current.iter().filter(|a| options.arches.contains(a)).cloned().collect()
	};
	if to_remove.is_empty() {
		return None;
	}

	let all_done = to_remove == current;
	Some(Resolution {
		arches: to_remove.into_iter().collect(),
		allarches,
		all_done,
		close: all_done && !bug.security && !bug.resolved && !options.no_resolve,
	})
}

/// Resolves each bug in `order`, returns whether any bug had to be skipped.
pub fn resolve_bugs(tracker: &dyn BugTracker, known_arches: &[String], order: &[u64], bugs: &BTreeMap<u64, BugRecord>, options: &ResolveOptions) -> crate::Result<bool> {
	let mut failed = false;
	for &id in order {
		let Some(bug) = bugs.get(&id) else {
			continue;
		};
		let Some(category) = bug.category else {
			log::error!("Bug {}: neither stablereq nor keywordreq", id);
			failed = true;
			continue;
		};
		let Some(resolution) = plan_resolution(bug, known_arches, options) else {
			let current = arches_from_cc(&bug.cc, known_arches);
			log::warn!("Bug {}: no specified arches CC-ed, found: {}", id, current.join(" "));
			continue;
		};

		log::info!("Bug {} ({})", id, category.name());
		if options.pretend {
			log::info!("pretend: would un-CC {}{}", resolution.arches.join(" "), if resolution.allarches { " (ALLARCHES)" } else { "" });
			if resolution.close {
				log::info!("pretend: would resolve the bug");
			}
			continue;
		}

		let uncc: Vec<String> = resolution.arches.iter().map(|a| format!("{}@{}", a, options.arch_cc_domain)).collect();
		tracker.resolve_bug(id, &uncc, &resolution.comment(), resolution.close)?;
		log::info!("Bug updated");
	}
	Ok(failed)
}
