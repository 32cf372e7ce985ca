//! Reconciling bugs with the result of checking their package lists.
//! 
//! For every bug the package list is matched, applied to the work tree and
//! checked for solvable dependencies. The outcome is turned into a flag
//! change and a comment, unless the cache shows nothing has changed since
//! the last check.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::bug::{arches_from_cc, split_dependent_bugs, BugRecord, BugTracker, BugUpdate};
use crate::cache::{Cache, CacheEntry};
use crate::checker::{check_dependencies, format_results, CheckResult, DependencyChecker};
use crate::git::{WorkTree, WorkTreeGuard};
use crate::keyword::{filter_prefix_keywords, sorted_keywords};
use crate::package_list::{
	can_allarches_for_keywords, expand_package_list, is_allarches, match_package_list, scan_package_list,
	suggested_keywords, MatchError, MatchOptions, PackageList,
};
use crate::repository::{MaskReason, Repository};
use crate::Config;

#[derive(Debug, Clone)]
pub struct SanityCheckOptions {
	/// Send updates to the tracker, otherwise only log them.
	pub update_bugs: bool,
	/// Stop after checking this many bugs.
	pub bug_limit: Option<usize>,
	/// Stop taking new bugs after this long.
	pub time_limit: Option<Duration>,
	/// Where the cache is persisted, `None` keeps it in memory.
	pub cache_path: Option<PathBuf>,
	pub cache_max_age: Duration,
	pub race_window: Duration,
	pub max_comment_len: usize,
	pub unassigned_assignee: String,
	pub arch_cc_domain: String,
}

impl SanityCheckOptions {
	pub fn from_config(config: &Config) -> Self {
		Self {
			update_bugs: false,
			bug_limit: None,
			time_limit: None,
			cache_path: Some(config.cache_path().clone()),
			cache_max_age: config.cache_max_age(),
			race_window: config.race_window(),
			max_comment_len: config.max_comment_len(),
			unassigned_assignee: config.unassigned_assignee().to_string(),
			arch_cc_domain: config.arch_cc_domain().to_string(),
		}
	}
}

impl Default for SanityCheckOptions {
	fn default() -> Self {
		let mut options = Self::from_config(&Config::default());
		options.cache_path = None;
		options
	}
}

/// What reconciling one bug came to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BugOutcome {
	/// The bug was not looked at.
	Skipped(String),
	/// The tracker already reflects the result.
	NoChange,
	/// Changes for the tracker, only logged in pretend mode.
	Update(BugUpdate),
	/// The tracker refused the update.
	UpdateFailed(BugUpdate, String),
}

enum Verdict {
	Checked(CheckResult),
	/// The cache entry still holds.
	Cached,
	Match(MatchError),
}

/// Changes worth proposing alongside the sanity-check result.
#[derive(Debug, Default)]
struct SideProposals {
	cc_arches: Vec<String>,
	cc_maintainers: Vec<String>,
	allarches: bool,
	allarches_chg: bool,
	need_security: bool,
	expanded: Option<String>,
}

pub const COMMENT_RESOLVED: &str = "All sanity-check issues have been resolved";
pub const COMMENT_RESET: &str = "Resetting sanity check; package list is empty or all packages are done.";

pub struct SanityCheck<'a> {
	repo: &'a dyn Repository,
	tracker: &'a dyn BugTracker,
	checker: &'a dyn DependencyChecker,
	work_tree: &'a mut dyn WorkTree,
	cache: Cache,
	options: SanityCheckOptions,
	bugs_done: usize,
}

impl<'a> SanityCheck<'a> {
	pub fn new(
		repo: &'a dyn Repository,
		tracker: &'a dyn BugTracker,
		checker: &'a dyn DependencyChecker,
		work_tree: &'a mut dyn WorkTree,
		cache: Cache,
		options: SanityCheckOptions,
	) -> Self {
		Self { repo, tracker, checker, work_tree, cache, options, bugs_done: 0 }
	}

	pub fn cache(&self) -> &Cache {
		&self.cache
	}

	pub fn into_cache(self) -> Cache {
		self.cache
	}

	/// Number of bugs the checker was run for.
	pub fn bugs_done(&self) -> usize {
		self.bugs_done
	}

	fn save_cache(&self) -> crate::Result<()> {
		match &self.options.cache_path {
			Some(path) => self.cache.save(path),
			None => Ok(()),
		}
	}

	/// Processes `order` one bug at a time.
	/// 
	/// `bugs` must hold every bug in `order` along with their dependencies.
	/// Bugs fetched along the way are added to it.
	/// 
	/// # Errors
	/// - `Error::GitDirtyWorkTree` aborts the run without saving the cache.
	/// - Any other collaborator failure aborts the run after saving the cache.
	pub fn run(&mut self, order: &[u64], bugs: &mut BTreeMap<u64, BugRecord>) -> crate::Result<Vec<(u64, BugOutcome)>> {
		let start = Utc::now();
		log::info!("Sanity check starting at {}", start);
		if !self.options.update_bugs {
			log::warn!("Running in pretend mode.");
		}
		let deadline = self.options.time_limit
			.and_then(|l| chrono::Duration::from_std(l).ok())
			.map(|l| start + l);

		let mut out = Vec::new();
		for &id in order {
			if self.options.bug_limit.is_some_and(|l| self.bugs_done >= l) {
				log::info!("Reached limit of {} bugs", self.bugs_done);
				break;
			}
			if deadline.is_some_and(|d| Utc::now() > d) {
				log::info!("Reached time limit");
				break;
			}

			let outcome = match self.check_bug(id, bugs, start) {
				Ok(o) => o,
				Err(e @ crate::Error::GitDirtyWorkTree(_)) => {
					log::error!("{}", e);
					return Err(e);
				},
				Err(e) => {
					self.save_cache()?;
					return Err(e);
				},
			};
			self.save_cache()?;
			out.push((id, outcome));
		}

		log::info!("Sanity check finished, {} bugs checked in {}", self.bugs_done, Utc::now() - start);
		Ok(out)
	}

	fn mark_updated(&mut self, id: u64) {
		if let Some(e) = self.cache.get_mut(id) {
			e.updated = true;
		}
	}

	/// Reconciles a single bug.
	pub fn check_bug(&mut self, id: u64, bugs: &mut BTreeMap<u64, BugRecord>, start: DateTime<Utc>) -> crate::Result<BugOutcome> {
		let Some(bug) = bugs.get(&id).cloned() else {
			log::warn!("Bug {}: not fetched", id);
			return Ok(BugOutcome::Skipped("not fetched".to_string()));
		};

		let race_window = chrono::Duration::from_std(self.options.race_window).unwrap_or_else(|_| chrono::Duration::zero());
		if self.options.update_bugs && start - bug.last_change_time < race_window {
			log::info!("Bug {}: skipping due to recent change", id);
			return Ok(BugOutcome::Skipped("recent change".to_string()));
		}
		let Some(category) = bug.category else {
			log::info!("Bug {}: neither stablereq nor keywordreq", id);
			return Ok(BugOutcome::Skipped("no category".to_string()));
		};
		let (kw_deps, other_deps) = split_dependent_bugs(bugs, id);
		if other_deps.iter().any(|d| !bugs.contains_key(d)) {
			log::warn!("Bug {}: dependencies not fetched, skipping", id);
			return Ok(BugOutcome::Skipped("dependencies not fetched".to_string()));
		}

		log::info!("Bug {} ({})", id, category);
		let mut side = SideProposals::default();
		let verdict = self.verify(&bug, bugs, &kw_deps, &mut side)?;
		let has_entry = matches!(verdict, Verdict::Checked(_) | Verdict::Cached);

		let no_changes = match &verdict {
			Verdict::Cached => true,
			Verdict::Checked(res) if res.success && bug.sanity_check == Some(true) => {
				self.mark_updated(id);
				log::info!("Still good");
				true
			},
			_ => false,
		};

		let (check_res, mut comment) = if no_changes {
			if !side.need_security && (bug.sanity_check != Some(true) || (side.cc_arches.is_empty() && side.expanded.is_none())) {
				return Ok(BugOutcome::NoChange);
			}
			(Some(true), None)
		} else {
			match verdict {
				Verdict::Checked(res) if res.success => {
					log::info!("All good");
					(Some(true), (bug.sanity_check == Some(false)).then(|| COMMENT_RESOLVED.to_string()))
				},
				Verdict::Checked(res) => {
					log::info!("Sanity check failed");
					(Some(false), Some(format!("Sanity check failed:\n\n{}", format_results(&res.issues).join("\n"))))
				},
				Verdict::Match(MatchError::KeywordNoneLeft) => {
					log::info!("Skipping, no CC and probably no work to do");
					return Ok(BugOutcome::Skipped("no work to do".to_string()));
				},
				Verdict::Match(MatchError::KeywordNotSpecified(packages)) => {
					log::info!("Skipping because of incomplete keywords");
					let packages: Vec<String> = packages.iter().map(|p| format!("- {}", p)).collect();
					(None, Some(format!("Keywords are not fully specified and arches are not CC-ed for the following packages:\n\n{}", packages.join("\n"))))
				},
				Verdict::Match(e) if e.is_empty_list() => {
					log::info!("Skipping because of empty package list");
					(None, Some(COMMENT_RESET.to_string()))
				},
				Verdict::Match(e) => {
					log::error!("Bug {}: {}", id, e);
					(Some(false), Some(format!("Unable to check for sanity:\n\n> {}", e)))
				},
				Verdict::Cached => (Some(true), None),
			}
		};

		if check_res.is_none() && bug.sanity_check.is_none() {
			return Ok(BugOutcome::NoChange);
		}

		if let Some(c) = comment.as_mut() {
			truncate_comment(c, self.options.max_comment_len);
		}

		if check_res == Some(false) && bug.sanity_check == Some(false) {
			let old = self.tracker.latest_own_comment(id)?;
			if let (Some(old), Some(new)) = (old, &comment) {
				if old.trim() == new.trim() {
					if has_entry {
						self.mark_updated(id);
					}
					log::info!("Failure reported already");
					return Ok(BugOutcome::NoChange);
				}
			}
		}

		if check_res != Some(true) {
			side.cc_arches.clear();
			side.allarches_chg = false;
			side.expanded = None;
		} else if bug.sanity_check == Some(true) {
			side.allarches_chg = false;
		}

		let update = self.build_update(check_res, comment, side);
		if !self.options.update_bugs {
			log::info!("New comment: {}", update.comment.as_deref().unwrap_or_default());
			return Ok(BugOutcome::Update(update));
		}
		match self.tracker.update_status(id, &update) {
			Ok(()) => {
				if has_entry {
					self.mark_updated(id);
				}
				log::info!("Bug status updated");
				Ok(BugOutcome::Update(update))
			},
			Err(e) => {
				log::error!("Bug {}: update failed: {}", id, e);
				Ok(BugOutcome::UpdateFailed(update, e.to_string()))
			},
		}
	}

	fn build_update(&self, check_res: Option<bool>, comment: Option<String>, side: SideProposals) -> BugUpdate {
		let mut update = BugUpdate { sanity_check: check_res, comment, ..Default::default() };
		if !side.cc_arches.is_empty() {
			log::info!("CC arches: {}", side.cc_arches.join(" "));
			if !side.cc_maintainers.is_empty() {
				log::info!("CC maintainers: {}", side.cc_maintainers.join(" "));
			}
			update.cc_add = side.cc_arches.into_iter().chain(side.cc_maintainers).collect();
		}
		if side.allarches_chg {
			log::info!("{} ALLARCHES", if side.allarches { "Adding" } else { "Removing" });
			if side.allarches {
				update.keywords_add.push("ALLARCHES".to_string());
			} else {
				update.keywords_remove.push("ALLARCHES".to_string());
			}
		}
		if side.need_security {
			log::info!("Adding SECURITY keyword");
			update.keywords_add.push("SECURITY".to_string());
		}
		if let Some(expanded) = &side.expanded {
			log::info!("Expanding package list");
			log::debug!("New package list: {}", expanded);
		}
		update.new_package_list = side.expanded;
		update
	}

	fn check_masks(&self, list: &PackageList) -> Result<(), MatchError> {
		for (pkg, keywords) in list.iter() {
			match self.repo.mask_status(pkg, keywords) {
				(MaskReason::NoMask, _) => {},
				(MaskReason::RepositoryMask, _) => {
					return Err(MatchError::PackageMasked(format!("package masked: {}", pkg.cpv())));
				},
				(MaskReason::ProfileMask, arches) => {
					return Err(MatchError::PackageMasked(format!("package masked: {}, in all profiles for arch: {}", pkg.cpv(), arches.join(" "))));
				},
				(MaskReason::KeywordMask, keywords) => {
					return Err(MatchError::PackageMasked(format!("package masked: {}, by keywords: {}", pkg.cpv(), keywords.join(" "))));
				},
			}
		}
		Ok(())
	}

	/// Fills in keywords for packages that have none from their suggestions.
	/// 
	/// Only works when every package ends up with the same non-empty set.
	fn infer_keywords(&self, list: &PackageList, stablereq: bool) -> crate::Result<Option<PackageList>> {
		let mut seen: Option<BTreeSet<String>> = None;
		let mut out = PackageList::new();
		for (pkg, keywords) in list.iter() {
			let set: BTreeSet<String> = if keywords.is_empty() {
				suggested_keywords(self.repo, pkg, stablereq)?
			} else {
				keywords.iter().cloned().collect()
			};
			if set.is_empty() || seen.as_ref().is_some_and(|s| *s != set) {
				return Ok(None);
			}
			out.insert(pkg.clone(), sorted_keywords(&set));
			seen = Some(set);
		}
		Ok(Some(out))
	}

	fn verify(&mut self, bug: &BugRecord, bugs: &mut BTreeMap<u64, BugRecord>, kw_deps: &[u64], side: &mut SideProposals) -> crate::Result<Verdict> {
		let stablereq = bug.is_stablereq();
		let arches_cced = !arches_from_cc(&bug.cc, self.repo.known_arches()).is_empty();
		let options = MatchOptions { only_new: true, ..Default::default() };

		let scan = match scan_package_list(self.repo, bug, &options)? {
			Ok(s) => s,
			Err(e) => return Ok(Verdict::Match(e)),
		};
		if let Err(e) = self.check_masks(&scan.packages) {
			return Ok(Verdict::Match(e));
		}
		let check_packages = match scan.verdict() {
			Ok(()) => scan.packages,
			Err(e) if e.is_incomplete_keywords() && bug.has_keyword("CC-ARCHES") && !arches_cced => {
				match self.infer_keywords(&scan.packages, stablereq)? {
					Some(list) => list,
					None => return Ok(Verdict::Match(e)),
				}
			},
			Err(e) => return Ok(Verdict::Match(e)),
		};

		let mut plist = check_packages.clone();
		for &dep in kw_deps {
			let Some(dep_bug) = bugs.get(&dep) else {
				continue;
			};
			match match_package_list(self.repo, dep_bug, &options)? {
				Ok(list) => plist.merge(&list),
				Err(e) if e.is_incomplete_keywords() => {
					return Ok(Verdict::Match(MatchError::DependentBug(format!("dependent bug #{} is missing keywords", dep))));
				},
				Err(e) if e.is_empty_list() => continue,
				Err(_) => {
					return Ok(Verdict::Match(MatchError::DependentBug(format!("dependent bug #{} has errors", dep))));
				},
			}
		}

		if bug.has_keyword("CC-ARCHES") && !arches_cced {
			if bug.assigned_to != self.options.unassigned_assignee {
				side.cc_arches = filter_prefix_keywords(&check_packages.all_keywords())
					.iter()
					.map(|a| format!("{}@{}", a, self.options.arch_cc_domain))
					.collect();
				side.cc_arches.sort();
			}
			side.cc_maintainers = check_packages.packages()
				.flat_map(|p| p.metadata.maintainers.iter())
				.filter(|m| !bug.cc.contains(*m) && **m != bug.assigned_to)
				.cloned()
				.collect::<BTreeSet<String>>()
				.into_iter()
				.collect();
		}

		if stablereq {
			let mut allarches = true;
			for pkg in plist.packages() {
				match is_allarches(pkg) {
					Ok(true) => {},
					Ok(false) => {
						allarches = false;
						break;
					},
					Err(e) => return Ok(Verdict::Match(e)),
				}
			}
			side.allarches = allarches && can_allarches_for_keywords(self.repo, &check_packages)?;
		}
		side.allarches_chg = side.allarches != bug.has_keyword("ALLARCHES");

		if !bug.security && !bug.has_keyword("SECURITY") {
			for &blocked in &bug.blocks {
				if !bugs.contains_key(&blocked) {
					let fetched = self.tracker.fetch_bugs(&[blocked])?;
					bugs.extend(fetched);
				}
				if bugs.get(&blocked).is_some_and(|b| b.security) {
					side.need_security = true;
					break;
				}
			}
		}

		if (bug.atoms.contains('*') || bug.atoms.contains('^')) && (arches_cced || !side.cc_arches.is_empty()) {
			match expand_package_list(self.repo, bug)? {
				Ok(expanded) => side.expanded = Some(expanded),
				Err(e) => log::debug!("Not expanding package list: {}", e),
			}
		}

		let fingerprint = plist.fingerprint();
		let now = Utc::now();
		if let Some(entry) = self.cache.get(bug.id) {
			match entry.recheck_reason(&fingerprint, bug.sanity_check, now, self.options.cache_max_age, self.options.update_bugs) {
				Some(reason) => log::info!("{}", reason),
				None => {
					log::info!("Cache entry is up-to-date.");
					return Ok(Verdict::Cached);
				},
			}
		}

		let res = {
			let guard = WorkTreeGuard::acquire(&mut *self.work_tree)?;
			for (pkg, keywords) in plist.iter() {
				self.repo.apply_keywords(pkg, keywords, stablereq)?;
			}
			let res = check_dependencies(self.checker, check_packages.iter())?;
			guard.release()?;
			res
		};

		self.bugs_done += 1;
		if self.bugs_done % 10 == 0 {
			log::info!("Tested {} bugs so far", self.bugs_done);
		}
		self.cache.insert(bug.id, CacheEntry::new(fingerprint, Some(res.success), now));
		Ok(Verdict::Checked(res))
	}
}

/// Cuts `comment` down to below `max_len` bytes, marking the cut.
pub fn truncate_comment(comment: &mut String, max_len: usize) {
	if comment.len() < max_len {
		return;
	}
	let mut end = max_len.saturating_sub(4);
	while !comment.is_char_boundary(end) {
		end -= 1;
	}
	comment.truncate(end);
	comment.push_str("...\n");
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn truncate_short() {
		let mut c = "abc".to_string();
		truncate_comment(&mut c, 10);
		assert_eq!(c, "abc");
	}
	#[test]
	fn truncate_long() {
		let mut c = "a".repeat(20);
		truncate_comment(&mut c, 10);
		assert_eq!(c, "aaaaaa...\n");
	}
	#[test]
	fn truncate_at_limit() {
		let mut c = "a".repeat(10);
		truncate_comment(&mut c, 10);
		assert_eq!(c.len(), 10);
		assert!(c.ends_with("...\n"));
	}
	#[test]
	fn truncate_multibyte() {
		let mut c = "ą".repeat(10);
		truncate_comment(&mut c, 9);
		assert_eq!(c, "ąą...\n");
	}
}
