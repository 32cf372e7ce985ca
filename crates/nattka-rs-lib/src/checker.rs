//! Dependency solvability checks and their reports.

pub mod pkgcheck;
pub use pkgcheck::Pkgcheck;

use serde::{Serialize, Deserialize};

use crate::repository::PackageCandidate;

/// An unsatisfied dependency of one package on one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIssue {
	pub category: String,
	pub package: String,
	pub version: String,
	/// Dependency variable, e.g. `rdepend`.
	pub attr: String,
	pub keyword: String,
	pub profile: String,
	#[serde(default)]
	pub profile_status: String,
	#[serde(default)]
	pub profile_deprecated: bool,
	#[serde(default)]
	pub num_profiles: Option<u32>,
	#[serde(default)]
	pub deps: Vec<String>,
}

impl CheckIssue {
	pub fn cpv(&self) -> String {
		format!("{}/{}-{}", self.category, self.package, self.version)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
	pub success: bool,
	pub issues: Vec<CheckIssue>,
}

impl Default for CheckResult {
	fn default() -> Self {
		Self { success: true, issues: Vec::new() }
	}
}

/// External oracle telling whether dependencies stay solvable.
pub trait DependencyChecker {
	/// Checks `atoms` (`=cat/pkg-ver`) on the arches in `keywords`.
	/// 
	/// Keywords are expected to be applied to the repository already.
	fn check(&self, keywords: &[String], atoms: &[String]) -> crate::Result<CheckResult>;
}

/// Runs `checker` once per run of consecutive packages sharing a keyword list.
pub fn check_dependencies<'a>(checker: &dyn DependencyChecker, list: impl IntoIterator<Item = &'a (PackageCandidate, Vec<String>)>) -> crate::Result<CheckResult> {
	let mut groups: Vec<(&Vec<String>, Vec<String>)> = Vec::new();
	for (pkg, keywords) in list {
		if let Some((_, atoms)) = groups.last_mut().filter(|(k, _)| *k == keywords) {
			atoms.push(pkg.versioned_atom());
			continue;
		}
		groups.push((keywords, vec![pkg.versioned_atom()]));
	}

	let mut out = CheckResult::default();
	for (keywords, atoms) in groups {
		log::debug!("Checking {} with keywords {}", atoms.join(" "), keywords.join(" "));
		let res = checker.check(keywords, &atoms)?;
		out.success &= res.success;
		out.issues.extend(res.issues);
	}
	Ok(out)
}

/// Renders issues as quoted comment lines, grouped by package.
pub fn format_results(issues: &[CheckIssue]) -> Vec<String> {
	let mut out = Vec::new();
	let mut start = 0;
	while start < issues.len() {
		let cpv = issues[start].cpv();
		let end = issues[start..].iter().position(|i| i.cpv() != cpv).map_or(issues.len(), |n| start + n);
		let mut group: Vec<&CheckIssue> = issues[start..end].iter().collect();
		group.sort_by(|a, b| (&a.keyword, &a.attr, &a.profile).cmp(&(&b.keyword, &b.attr, &b.profile)));

		out.push(format!("> {}", cpv));
		for i in group {
			let deprecated = if i.profile_deprecated { "deprecated " } else { "" };
			let total = i.num_profiles.map(|n| format!(" ({} total)", n)).unwrap_or_default();
			out.push(format!(">   {} {} {}{} profile {}{}", i.attr, i.keyword, deprecated, i.profile_status, i.profile, total));
			let mut deps = i.deps.clone();
			deps.sort();
			out.extend(deps.into_iter().map(|d| format!(">     {}", d)));
		}
		start = end;
	}
	out
}

#[cfg(test)]
mod test {
	use super::*;
	use std::cell::RefCell;
	use crate::repository::PackageVersion;

	fn issue(version: &str, keyword: &str, profile: &str, deps: &[&str]) -> CheckIssue {
		CheckIssue {
			category: "test".into(),
			package: "foo".into(),
			version: version.into(),
			attr: "rdepend".into(),
			keyword: keyword.into(),
			profile: profile.into(),
			profile_status: "stable".into(),
			deps: deps.iter().map(|d| d.to_string()).collect(),
			..Default::default()
		}
	}

	#[test]
	fn format_grouped() {
		let mut dep = issue("1", "~amd64", "default/linux/amd64", &["test/z", "test/a"]);
		dep.profile_deprecated = true;
		dep.num_profiles = Some(3);
		let issues = vec![
			issue("1", "~x86", "default/linux/x86", &["test/b"]),
			dep,
			issue("2", "~amd64", "default/linux/amd64", &["test/c"]),
		];
		assert_eq!(format_results(&issues), vec![
			"> test/foo-1",
			">   rdepend ~amd64 deprecated stable profile default/linux/amd64 (3 total)",
			">     test/a",
			">     test/z",
			">   rdepend ~x86 stable profile default/linux/x86",
			">     test/b",
			"> test/foo-2",
			">   rdepend ~amd64 stable profile default/linux/amd64",
			">     test/c",
		]);
	}

	#[test]
	fn format_empty() { assert!(format_results(&[]).is_empty()); }

	struct Recorder(RefCell<Vec<(Vec<String>, Vec<String>)>>);

	impl DependencyChecker for Recorder {
		fn check(&self, keywords: &[String], atoms: &[String]) -> crate::Result<CheckResult> {
			self.0.borrow_mut().push((keywords.to_vec(), atoms.to_vec()));
			Ok(CheckResult { success: keywords.len() == 1, issues: Vec::new() })
		}
	}

	#[test]
	fn groups_consecutive_keywords() {
		let pkg = |v: &str| PackageCandidate::new("test", "foo", v.parse::<PackageVersion>().unwrap());
		let kw = |s: &str| s.split(' ').map(String::from).collect::<Vec<_>>();
		let list = vec![(pkg("1"), kw("amd64")), (pkg("2"), kw("amd64")), (pkg("3"), kw("amd64 x86")), (pkg("4"), kw("amd64"))];
		let checker = Recorder(RefCell::new(Vec::new()));
		let res = check_dependencies(&checker, &list).unwrap();
		assert!(!res.success);
		let calls = checker.0.into_inner();
		assert_eq!(calls.len(), 3);
		assert_eq!(calls[0].1, vec!["=test/foo-1", "=test/foo-2"]);
		assert_eq!(calls[2].1, vec!["=test/foo-4"]);
	}
}
