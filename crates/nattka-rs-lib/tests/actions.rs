use std::collections::BTreeMap;

use nattka_rs::actions::{apply_bugs, find_bugs, resolve_bugs, ApplyOptions, BugSelection, ResolveOptions};
use nattka_rs::{BugCategory, BugRecord};
use nattka_rs_test_utils::{bug, FakeTracker};

fn strs(v: &[&str]) -> Vec<String> {
	v.iter().map(|s| s.to_string()).collect()
}

fn checked(mut b: BugRecord) -> BugRecord {
	b.sanity_check = Some(true);
	b
}

fn bug_map(bugs: impl IntoIterator<Item = BugRecord>) -> BTreeMap<u64, BugRecord> {
	bugs.into_iter().map(|b| (b.id, b)).collect()
}

#[test]
fn apply_stabilization() {
	let (dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	let bugs = bug_map([checked(bug(1, Some(BugCategory::StableReq), "=test/amd64-stable-2 amd64", &[]))]);
	let options = ApplyOptions { arches: strs(&["amd64"]), ..Default::default() };
	let (out, failed) = apply_bugs(&repo, &[1], &bugs, &options).expect("apply failed");

	assert_eq!(out, "# bug 1 (STABLEREQ)\n=test/amd64-stable-2 ~amd64\n\n");
	assert!(!failed);
	let data = std::fs::read_to_string(dir.path().join("test/amd64-stable/amd64-stable-2.ebuild")).expect("failed to read ebuild");
	assert!(data.contains("KEYWORDS=\"amd64\""));
}

#[test]
fn apply_keywording_ordered() {
	let (_dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	let bugs = bug_map([checked(bug(1, Some(BugCategory::KeywordReq), "dep/a\ndep/b\ndep/d", &["amd64@gentoo.org"]))]);
	let options = ApplyOptions { arches: strs(&["amd64"]), no_update: true, ..Default::default() };
	let (out, _) = apply_bugs(&repo, &[1], &bugs, &options).expect("apply failed");

	assert_eq!(out, "# bug 1 (KEYWORDREQ)\n=dep/d-1 **  # -> ~amd64\n=dep/b-1 **  # -> ~amd64\n=dep/a-1 **  # -> ~amd64\n\n");
}

#[test]
fn apply_other_arch_skipped() {
	let (_dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	let bugs = bug_map([checked(bug(1, Some(BugCategory::KeywordReq), "test/amd64-testing hppa", &[]))]);
	let options = ApplyOptions { arches: strs(&["x86"]), ..Default::default() };
	let (out, failed) = apply_bugs(&repo, &[1], &bugs, &options).expect("apply failed");

	assert_eq!(out, "# bug 1: no packages match requested arch\n\n");
	assert!(failed);
}

#[test]
fn apply_requires_sanity_check() {
	let (_dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	let mut failing = bug(2, Some(BugCategory::KeywordReq), "test/amd64-testing hppa", &[]);
	failing.sanity_check = Some(false);
	let bugs = bug_map([bug(1, Some(BugCategory::KeywordReq), "test/amd64-testing hppa", &[]), failing]);
	let options = ApplyOptions { arches: strs(&["hppa"]), ..Default::default() };
	let (out, failed) = apply_bugs(&repo, &[1, 2], &bugs, &options).expect("apply failed");

	assert_eq!(out, "# bug 1: no sanity check result\n\n# bug 2: sanity check failed\n\n");
	assert!(failed);

	let options = ApplyOptions { ignore_sanity_check: true, no_update: true, ..options };
	let (_, failed) = apply_bugs(&repo, &[1, 2], &bugs, &options).expect("apply failed");
	assert!(!failed);
}

#[test]
fn apply_unresolved_dependency() {
	let (_dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	let mut b = checked(bug(1, Some(BugCategory::KeywordReq), "test/amd64-testing hppa", &[]));
	b.depends = vec![2, 3, 4];
	let mut done = bug(3, None, "", &[]);
	done.resolved = true;
	/* nothing left to do for hppa */
	let keyworded = bug(4, Some(BugCategory::KeywordReq), "test/amd64-stable-hppa-testing hppa", &[]);
	let bugs = bug_map([b, done, keyworded]);
	let options = ApplyOptions { arches: strs(&["hppa"]), ..Default::default() };
	let (out, failed) = apply_bugs(&repo, &[1], &bugs, &options).expect("apply failed");

	assert_eq!(out, "# bug 1: unresolved dependency on 2\n\n");
	assert!(failed);
}

#[test]
fn apply_allarches() {
	let (_dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	let mut b = checked(bug(1, Some(BugCategory::StableReq), "=test/allarches-2 amd64 x86", &[]));
	b.keywords.push("ALLARCHES".to_string());
	let bugs = bug_map([b]);
	let options = ApplyOptions { arches: strs(&["amd64"]), no_update: true, ..Default::default() };
	let (out, _) = apply_bugs(&repo, &[1], &bugs, &options).expect("apply failed");
	assert_eq!(out, "# bug 1 (STABLEREQ) ALLARCHES\n=test/allarches-2 ~amd64 ~x86\n\n");

	let options = ApplyOptions { ignore_allarches: true, ..options };
	let (out, _) = apply_bugs(&repo, &[1], &bugs, &options).expect("apply failed");
	assert_eq!(out, "# bug 1 (STABLEREQ)\n=test/allarches-2 ~amd64\n\n");
}

fn tracker() -> FakeTracker {
	let mut resolved = bug(2, Some(BugCategory::StableReq), "", &[]);
	resolved.resolved = true;
	let mut security = bug(4, Some(BugCategory::StableReq), "", &["amd64@gentoo.org"]);
	security.security = true;
	let mut with_dep = bug(5, Some(BugCategory::KeywordReq), "", &["amd64@gentoo.org"]);
	with_dep.depends = vec![2];
	FakeTracker::new([
		bug(1, Some(BugCategory::KeywordReq), "", &[]),
		resolved,
		bug(3, None, "", &[]),
		security,
		with_dep,
	])
}

#[test]
fn find_default() {
	let (order, bugs) = find_bugs(&tracker(), &BugSelection::default()).expect("search failed");
	assert_eq!(order, vec![5, 4, 1]);
	assert!(!bugs.contains_key(&2));
}

#[test]
fn find_explicit() {
	let selection = BugSelection { bugs: vec![3, 2, 1], ..Default::default() };
	let (order, _) = find_bugs(&tracker(), &selection).expect("search failed");
	assert_eq!(order, vec![3, 2, 1]);
}

#[test]
fn find_filtered() {
	let selection = BugSelection { categories: vec![BugCategory::StableReq], ..Default::default() };
	assert_eq!(find_bugs(&tracker(), &selection).expect("search failed").0, vec![4]);

	let selection = BugSelection { security: true, ..Default::default() };
	assert_eq!(find_bugs(&tracker(), &selection).expect("search failed").0, vec![4]);

	let selection = BugSelection { cc: strs(&["amd64@gentoo.org"]), ..Default::default() };
	assert_eq!(find_bugs(&tracker(), &selection).expect("search failed").0, vec![5, 4]);
}

#[test]
fn find_with_dependencies() {
	let selection = BugSelection { bugs: vec![5], fetch_dependencies: true, ..Default::default() };
	let (order, bugs) = find_bugs(&tracker(), &selection).expect("search failed");
	assert_eq!(order, vec![5]);
	assert!(bugs.get(&2).is_some_and(|b| b.resolved));
}

fn known() -> Vec<String> {
	strs(&["alpha", "amd64", "arm64", "hppa", "x86"])
}

#[test]
fn resolve_partial_and_full() {
	let mut all = bug(3, Some(BugCategory::StableReq), "", &["amd64@gentoo.org", "x86@gentoo.org"]);
	all.keywords.push("ALLARCHES".to_string());
	let mut sec = bug(4, Some(BugCategory::StableReq), "", &["hppa@gentoo.org"]);
	sec.security = true;
	let tracker = FakeTracker::new([
		bug(1, Some(BugCategory::KeywordReq), "", &["amd64@gentoo.org", "hppa@gentoo.org"]),
		bug(2, Some(BugCategory::KeywordReq), "", &["hppa@gentoo.org", "dev@example.com"]),
		all,
		sec,
		bug(5, Some(BugCategory::KeywordReq), "", &["x86@gentoo.org"]),
	]);
	let bugs = tracker.bugs.borrow().clone();
	let options = ResolveOptions { arches: strs(&["hppa", "amd64"]), ..Default::default() };
	let failed = resolve_bugs(&tracker, &known(), &[1, 2, 3, 4, 5], &bugs, &options).expect("resolve failed");

	assert!(!failed);
	assert_eq!(*tracker.resolutions.borrow(), vec![
		(1, strs(&["amd64@gentoo.org", "hppa@gentoo.org"]), "amd64 hppa done\n\nall arches done".to_string(), true),
		(2, strs(&["hppa@gentoo.org"]), "hppa done\n\nall arches done".to_string(), true),
		(3, strs(&["amd64@gentoo.org", "x86@gentoo.org"]), "amd64 x86 (ALLARCHES) done\n\nall arches done".to_string(), true),
		(4, strs(&["hppa@gentoo.org"]), "hppa done\n\nall arches done".to_string(), false),
	]);
	assert!(tracker.bug(1).is_some_and(|b| b.resolved && b.cc.is_empty()));
	assert_eq!(tracker.bug(2).map(|b| b.cc), Some(strs(&["dev@example.com"])));
}

#[test]
fn resolve_some_left() {
	let tracker = FakeTracker::new([bug(1, Some(BugCategory::KeywordReq), "", &["amd64@gentoo.org", "hppa@gentoo.org"])]);
	let bugs = tracker.bugs.borrow().clone();
	let options = ResolveOptions { arches: strs(&["hppa"]), ..Default::default() };
	resolve_bugs(&tracker, &known(), &[1], &bugs, &options).expect("resolve failed");

	assert_eq!(*tracker.resolutions.borrow(), vec![(1, strs(&["hppa@gentoo.org"]), "hppa done".to_string(), false)]);
}

#[test]
fn resolve_pretend() {
	let tracker = FakeTracker::new([bug(1, Some(BugCategory::KeywordReq), "", &["hppa@gentoo.org"]), bug(2, None, "", &[])]);
	let bugs = tracker.bugs.borrow().clone();
	let options = ResolveOptions { arches: strs(&["hppa"]), pretend: true, ..Default::default() };
	let failed = resolve_bugs(&tracker, &known(), &[1, 2], &bugs, &options).expect("resolve failed");

	assert!(failed);
	assert!(tracker.resolutions.borrow().is_empty());
}
