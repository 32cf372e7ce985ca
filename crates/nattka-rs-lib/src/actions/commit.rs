//! Committing keyword changes, one commit per ebuild.

use std::collections::BTreeMap;
use std::path::Path;

use crate::bug::BugRecord;
use crate::depgraph::order_packages;
use crate::git::git_commit;
use crate::package_list::{match_package_list, MatchOptions};
use crate::repository::{PackageCandidate, Repository};

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
	pub arches: Vec<String>,
	pub ignore_allarches: bool,
}

/// `cat/pkg: Stabilize 1 amd64 x86, #123`
pub fn commit_message(bug: &BugRecord, pkg: &PackageCandidate, keywords: &[String], allarches: bool) -> String {
	let action = if bug.is_stablereq() { "Stabilize" } else { "Keyword" };
	let keywords = if allarches { "ALLARCHES".to_string() } else { keywords.join(" ") };
	format!("{}: {} {} {}, #{}", pkg.key(), action, pkg.version, keywords, bug.id)
}

/// Commits the ebuilds of each bug in dependency order.
/// 
/// Ebuilds without changes are skipped. Returns the summaries printed
/// by git and whether any bug had to be skipped.
pub fn commit_bugs(repo: &dyn Repository, work_tree: &Path, order: &[u64], bugs: &BTreeMap<u64, BugRecord>, options: &CommitOptions) -> crate::Result<(Vec<String>, bool)> {
	let mut out = Vec::new();
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

		let match_options = MatchOptions {
			filter_arch: options.arches.clone(),
			permit_allarches: !options.ignore_allarches,
			..Default::default()
		};
		let plist = match match_package_list(repo, bug, &match_options)? {
			Ok(l) => l,
			Err(e) => {
				log::error!("Bug {}: {}", id, e);
				failed = true;
				continue;
			},
		};

		let allarches = !options.ignore_allarches && bug.has_keyword("ALLARCHES");
		log::info!("Bug {} ({}){}", id, category.name(), if allarches { " ALLARCHES" } else { "" });

		for pkg in order_packages(plist.packages()) {
			let keywords: Vec<String> = plist.get(pkg).into_iter().flatten()
				.filter(|k| options.arches.contains(k))
				.cloned()
				.collect();
			if keywords.is_empty() {
				continue;
			}
			let Some(path) = &pkg.path else {
				return Err(crate::Error::PackageNotFound(pkg.cpv()));
			};
			let relative = path.strip_prefix(repo.location()).unwrap_or(path);
			let message = commit_message(bug, pkg, &keywords, allarches);
			match git_commit(work_tree, &message, &[relative.to_string_lossy().to_string()]) {
				Ok(summary) => out.push(summary),
				Err(crate::Error::GitCommitNoChanges) => log::debug!("Nothing to commit for {}", pkg.cpv()),
				Err(e) => return Err(e),
			}
		}
	}

	Ok((out, failed))
}
