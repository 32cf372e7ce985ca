//! Keywording packages on the local tree according to bugs.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::bug::{BugRecord, BugCategory};
use crate::depgraph::order_packages;
use crate::package_list::{match_package_list, MatchOptions, PackageList};
use crate::repository::Repository;

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
	/// Arches to act on.
	pub arches: Vec<String>,
	pub ignore_allarches: bool,
	pub ignore_dependencies: bool,
	pub ignore_sanity_check: bool,
	/// Print the list without touching ebuilds.
	pub no_update: bool,
}

/// Dependencies of `bug` that still need work on the arches of `keywords`.
fn unresolved_dependencies(repo: &dyn Repository, bug: &BugRecord, bugs: &BTreeMap<u64, BugRecord>, keywords: Vec<String>) -> crate::Result<Vec<u64>> {
	let mut out = Vec::new();
	for &dep in &bug.depends {
		let Some(dep_bug) = bugs.get(&dep) else {
			out.push(dep);
			continue;
		};
		if dep_bug.resolved {
			continue;
		}
		if dep_bug.category == bug.category {
			let options = MatchOptions { only_new: true, filter_arch: keywords.clone(), ..Default::default() };
			if let Err(e) = match_package_list(repo, dep_bug, &options)? {
				/* nothing left for these arches */
				if e.is_empty_list() {
					continue;
				}
			}
		}
		out.push(dep);
	}
	Ok(out)
}

/// Renders a bug's packages in `package.accept_keywords` format.
pub fn format_package_list(bug: &BugRecord, plist: &PackageList, allarches: bool) -> String {
	let category = bug.category.map(|c| c.name()).unwrap_or_default();
	let mut out = format!("# bug {} ({}){}\n", bug.id, category, if allarches { " ALLARCHES" } else { "" });
	for pkg in order_packages(plist.packages()) {
		let keywords: Vec<String> = plist.get(pkg).into_iter().flatten().map(|k| format!("~{}", k)).collect();
		if bug.is_stablereq() {
			let _ = writeln!(out, "={} {}", pkg.cpv(), keywords.join(" "));
		} else {
			let _ = writeln!(out, "={} **  # -> {}", pkg.cpv(), keywords.join(" "));
		}
	}
	out
}

/// Keywords the packages of `order` for the requested arches.
/// 
/// Returns the text to print and whether any bug had to be skipped.
pub fn apply_bugs(repo: &dyn Repository, order: &[u64], bugs: &BTreeMap<u64, BugRecord>, options: &ApplyOptions) -> crate::Result<(String, bool)> {
	let mut out = String::new();
	let mut failed = false;

	for &id in order {
		let Some(bug) = bugs.get(&id) else {
			continue;
		};
		if bug.category.is_none() {
			let _ = writeln!(out, "# bug {}: neither stablereq nor keywordreq\n", id);
			failed = true;
			continue;
		}

		let match_options = MatchOptions {
			only_new: true,
			filter_arch: options.arches.clone(),
			permit_allarches: !options.ignore_allarches,
		};
		let plist = match match_package_list(repo, bug, &match_options)? {
			Ok(l) => l,
			Err(e) => {
				let _ = writeln!(out, "# bug {}: {}\n", id, e);
				failed = true;
				continue;
			},
		};

		if bug.sanity_check != Some(true) && !options.ignore_sanity_check {
			let reason = if bug.sanity_check == Some(false) { "sanity check failed" } else { "no sanity check result" };
			let _ = writeln!(out, "# bug {}: {}\n", id, reason);
			failed = true;
			continue;
		}

		let unresolved = unresolved_dependencies(repo, bug, bugs, plist.all_keywords().into_iter().collect())?;
		if !unresolved.is_empty() && !options.ignore_dependencies {
			let unresolved: Vec<String> = unresolved.iter().map(|d| d.to_string()).collect();
			let _ = writeln!(out, "# bug {}: unresolved dependency on {}\n", id, unresolved.join(", "));
			failed = true;
			continue;
		}

		let allarches = !options.ignore_allarches && bug.has_keyword("ALLARCHES");
		out.push_str(&format_package_list(bug, &plist, allarches));
		out.push('\n');

		if !options.no_update {
			let stable = bug.category == Some(BugCategory::StableReq);
			for (pkg, keywords) in plist.iter() {
				repo.apply_keywords(pkg, keywords, stable)?;
			}
		}
	}

	Ok((out, failed))
}
