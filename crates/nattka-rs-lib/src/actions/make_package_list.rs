//! Growing a package list until its dependencies are satisfied.

use std::collections::BTreeSet;

use crate::bug::{BugCategory, BugRecord};
use crate::checker::{check_dependencies, format_results, DependencyChecker};
use crate::git::{WorkTree, WorkTreeGuard};
use crate::package_list::{match_package_list, MatchOptions, PackageList};
use crate::repository::{Atom, PackageCandidate, Repository};

#[derive(Debug, Clone)]
pub struct MakePackageListOptions {
	/// The package to start from followed by any known dependencies.
	pub packages: Vec<String>,
	/// Arches for the first package, all suggested ones when empty.
	pub arches: Vec<String>,
	pub stabilization: bool,
	pub arch_cc_domain: String,
}

fn match_list(repo: &dyn Repository, bug: &BugRecord) -> crate::Result<PackageList> {
	let options = MatchOptions { only_new: true, ..Default::default() };
	match match_package_list(repo, bug, &options)? {
		Ok(list) => Ok(list),
		Err(e) if e.is_empty_list() => Ok(PackageList::new()),
		Err(e) => Err(e.into()),
	}
}

fn apply(repo: &dyn Repository, list: &PackageList, stable: bool) -> crate::Result<()> {
	for (pkg, keywords) in list.iter() {
		repo.apply_keywords(pkg, keywords, stable)?;
	}
	Ok(())
}

/// Name used for a package in the list, a version only for stabilization.
fn list_entry(pkg: &PackageCandidate, stabilization: bool) -> String {
	if stabilization { pkg.cpv() } else { pkg.key() }
}

/// Newest version satisfying `dep`, ignoring USE dependencies.
fn satisfy(repo: &dyn Repository, dep: &str, stabilization: bool) -> crate::Result<Option<String>> {
	let mut atom = Atom::parse(dep)?;
	atom.use_deps.clear();
	let mut matches = repo.match_atom(&atom)?;
	matches.sort();
	Ok(matches.iter().rev()
		.find(|m| !stabilization || !m.keywords.is_empty())
		.map(|m| list_entry(m, stabilization)))
}

/// Keywords the packages in the work tree, adding dependencies the checker
/// reports as missing until it passes.
/// 
/// Returns the package list text, the first package with its arches and
/// the rest with `^`. Every change to the work tree is rolled back.
pub fn make_package_list(repo: &dyn Repository, checker: &dyn DependencyChecker, work_tree: &mut dyn WorkTree, options: &MakePackageListOptions) -> crate::Result<String> {
	let Some(first) = options.packages.first() else {
		return Err(crate::Error::Config("no packages specified".to_string()));
	};
	let guard = WorkTreeGuard::acquire(work_tree)?;
	let stable = options.stabilization;
	let category = if stable { BugCategory::StableReq } else { BugCategory::KeywordReq };
	let initial_arches = if options.arches.is_empty() { "*".to_string() } else { options.arches.join(" ") };
	let mut packages = options.packages.clone();

	let plist = match_list(repo, &BugRecord::new(0, Some(category), format!("{} {}\n", first, initial_arches)))?;
	if plist.len() != 1 {
		return Err(crate::Error::Parse(format!("{} does not match a single package needing keywords", first)));
	}
	let cc_arches: Vec<String> = plist.all_keywords().into_iter()
		.filter(|k| !k.contains('-'))
		.map(|k| format!("{}@{}", k, options.arch_cc_domain))
		.collect();

	let mut bug = BugRecord::new(0, Some(category), packages.join("\n"));
	bug.cc = cc_arches.clone();
	let mut new_plist = match_list(repo, &bug)?;
	apply(repo, &new_plist, stable)?;

	let mut iteration = 1;
	loop {
		log::info!("Iteration {}: checking dependencies", iteration);
		let plist = new_plist;
		let res = check_dependencies(checker, plist.iter())?;
		if res.success {
			break;
		}

		let mut new_packages = BTreeSet::new();
		for issue in &res.issues {
			for dep in &issue.deps {
				match satisfy(repo, dep, stable)? {
					Some(p) => { new_packages.insert(p); },
					None => return Err(crate::Error::PackageNotFound(format!("no match for dependency: {}", dep))),
				}
			}
		}
		if new_packages.is_empty() {
			return Err(crate::Error::Checker("checker failed without naming dependencies".to_string()));
		}
		log::info!("New packages: {}", new_packages.iter().cloned().collect::<Vec<_>>().join(" "));

		let mut bug = BugRecord::new(0, Some(category), new_packages.iter().cloned().collect::<Vec<_>>().join("\n"));
		bug.cc = cc_arches.clone();
		new_plist = match_list(repo, &bug)?;
		new_packages.retain(|p| {
			let found = new_plist.packages().any(|x| list_entry(x, stable) == *p);
			if !found {
				log::info!("Package {} seems to be a red herring (already keyworded everywhere)", p);
			}
			found
		});
		apply(repo, &new_plist, stable)?;

		log::info!("Iteration {}: verifying", iteration);
		let res = check_dependencies(checker, plist.iter())?;
		if !res.success {
			log::error!("Attempt to satisfy dependencies failed:");
			log::error!("{}", format_results(&res.issues).join("\n"));
			log::error!("Please correct the package list and retry.");
			break;
		}

		for p in new_packages {
			if packages.contains(&p) {
				return Err(crate::Error::Checker(format!("{} is already in the package list", p)));
			}
			packages.push(p);
		}
		iteration += 1;
	}
	guard.release()?;

	if !cc_arches.is_empty() {
		log::info!("Target CC: {}", cc_arches.join(" "));
	}
	if stable {
		log::warn!("The package list contains newest versions visible.");
		log::warn!("Please adjust the package list to desired versions.");
	}

	let mut out = format!("{} {}\n", packages[0], initial_arches);
	for p in &packages[1..] {
		out.push_str(&format!("{} ^\n", p));
	}
	Ok(out)
}
