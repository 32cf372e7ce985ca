use nattka_rs::package_list::{match_package_list, MatchError, MatchOptions, PackageList};
use nattka_rs::repository::MaskReason;
use nattka_rs::{BugCategory, Repository};
use nattka_rs_test_utils::bug;

fn matched(category: BugCategory, atoms: &str, cc: &[&str], options: &MatchOptions) -> Result<Vec<(String, Vec<String>)>, MatchError> {
	let (_dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	match_package_list(&repo, &bug(1, Some(category), atoms, cc), options)
		.expect("repository failure")
		.map(|l: PackageList| l.iter().map(|(p, k)| (p.cpv(), k.clone())).collect())
}

fn kw(s: &str) -> Vec<String> {
	s.split_whitespace().map(|s| s.to_string()).collect()
}

#[test]
fn keywordreq_newest_keyworded() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing hppa", &[], &Default::default());
	assert_eq!(res, Ok(vec![("test/amd64-testing-2".to_string(), kw("hppa"))]));
}

#[test]
fn keywordreq_tilde_stripped() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing ~hppa ~x86", &[], &Default::default());
	assert_eq!(res, Ok(vec![("test/amd64-testing-2".to_string(), kw("hppa x86"))]));
}

#[test]
fn stablereq_versioned() {
	let res = matched(BugCategory::StableReq, "=test/amd64-stable-2 amd64\ntest/amd64-stable-hppa-testing-2 hppa", &[], &Default::default());
	assert_eq!(res, Ok(vec![
		("test/amd64-stable-2".to_string(), kw("amd64")),
		("test/amd64-stable-hppa-testing-2".to_string(), kw("hppa")),
	]));
}

#[test]
fn stablereq_unversioned_rejected() {
	let res = matched(BugCategory::StableReq, "test/amd64-stable amd64", &[], &Default::default());
	assert!(matches!(res, Err(MatchError::PackageInvalid(_))));
}

#[test]
fn keywords_from_cc() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing", &["hppa@gentoo.org", "example@gentoo.org"], &Default::default());
	assert_eq!(res, Ok(vec![("test/amd64-testing-2".to_string(), kw("hppa"))]));
}

#[test]
fn keywords_limited_by_cc() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing hppa x86", &["x86@gentoo.org"], &Default::default());
	assert_eq!(res, Ok(vec![("test/amd64-testing-2".to_string(), kw("x86"))]));
}

#[test]
fn everything_filtered_by_cc() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing hppa", &["x86@gentoo.org"], &Default::default());
	assert_eq!(res, Err(MatchError::PackageListEmpty("no packages match requested arch".to_string())));
}

#[test]
fn nothing_left_to_suggest() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing", &[], &Default::default());
	assert_eq!(res, Err(MatchError::KeywordNoneLeft));
}

#[test]
fn partially_specified() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing\ntest/live x86", &[], &Default::default());
	assert_eq!(res, Err(MatchError::KeywordNotSpecified(vec!["test/amd64-testing".to_string()])));
}

#[test]
fn star_suggests() {
	let res = matched(BugCategory::StableReq, "=test/amd64-stable-hppa-testing-2 *", &[], &Default::default());
	assert_eq!(res, Ok(vec![("test/amd64-stable-hppa-testing-2".to_string(), kw("amd64 hppa"))]));
}

#[test]
fn star_stable_only_testing_arches() {
	let res = matched(BugCategory::StableReq, "=test/hppa-stable-2 *", &[], &Default::default());
	assert_eq!(res, Ok(vec![("test/hppa-stable-2".to_string(), kw("amd64"))]));
}

#[test]
fn star_keywording_from_siblings() {
	let res = matched(BugCategory::KeywordReq, "=test/hppa-stable-2 *", &[], &Default::default());
	assert_eq!(res, Ok(vec![("test/hppa-stable-2".to_string(), kw("hppa"))]));
}

#[test]
fn caret_repeats() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing hppa\ntest/amd64-stable ^ x86", &[], &Default::default());
	assert_eq!(res, Ok(vec![
		("test/amd64-testing-2".to_string(), kw("hppa")),
		("test/amd64-stable-2".to_string(), kw("hppa x86")),
	]));
}

#[test]
fn caret_first_line() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing ^", &[], &Default::default());
	assert!(matches!(res, Err(MatchError::KeywordNoMatch(_))));
}

#[test]
fn dash_skips() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing -\ntest/live hppa", &[], &Default::default());
	assert_eq!(res, Ok(vec![("test/live-1".to_string(), kw("hppa"))]));
}

#[test]
fn unknown_arch() {
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing mips", &[], &Default::default());
	assert_eq!(res, Err(MatchError::KeywordNoMatch("incorrect keywords: mips".to_string())));
}

#[test]
fn no_match() {
	let res = matched(BugCategory::KeywordReq, "test/nonexistent amd64", &[], &Default::default());
	assert_eq!(res, Err(MatchError::PackageNoMatch("no match for package: test/nonexistent".to_string())));
}

#[test]
fn empty_list() {
	let res = matched(BugCategory::KeywordReq, "# nothing here\n\n", &[], &Default::default());
	assert_eq!(res, Err(MatchError::PackageListEmpty("empty package list".to_string())));
}

#[test]
fn only_new_done() {
	let options = MatchOptions { only_new: true, ..Default::default() };
	let res = matched(BugCategory::StableReq, "=test/amd64-stable-1 amd64", &[], &options);
	assert_eq!(res, Err(MatchError::PackageListDoneAlready));
}

#[test]
fn only_new_testing_counts() {
	let options = MatchOptions { only_new: true, ..Default::default() };
	let res = matched(BugCategory::KeywordReq, "test/amd64-stable-hppa-testing amd64 hppa x86", &[], &options);
	assert_eq!(res, Ok(vec![("test/amd64-stable-hppa-testing-2".to_string(), kw("x86"))]));
}

#[test]
fn arch_filter() {
	let options = MatchOptions { filter_arch: kw("x86"), ..Default::default() };
	let res = matched(BugCategory::KeywordReq, "test/amd64-testing hppa", &[], &options);
	assert!(matches!(res, Err(MatchError::PackageListEmpty(_))));
}

#[test]
fn arch_filter_allarches() {
	let options = MatchOptions { filter_arch: kw("amd64"), permit_allarches: true, ..Default::default() };
	let (_dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	let mut b = bug(1, Some(BugCategory::StableReq), "=test/allarches-2 amd64 x86", &[]);
	b.keywords.push("ALLARCHES".to_string());
	let list = match_package_list(&repo, &b, &options).expect("repository failure").expect("no match");
	let (_, keywords) = list.iter().next().expect("empty list");
	assert_eq!(*keywords, kw("amd64 x86"));
}

#[test]
fn masks() {
	let (_dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	let get = |atom: &str| repo.package_versions(atom).expect("lookup failed").remove(0);

	assert_eq!(repo.mask_status(&get("test/masked"), &kw("amd64")), (MaskReason::RepositoryMask, vec![]));
	assert_eq!(repo.mask_status(&get("test/profile-masked"), &kw("amd64 hppa")), (MaskReason::ProfileMask, kw("hppa")));
	assert_eq!(repo.mask_status(&get("test/profile-masked"), &kw("amd64")), (MaskReason::NoMask, vec![]));
	assert_eq!(repo.mask_status(&get("test/keyword-masked"), &kw("amd64 x86")), (MaskReason::KeywordMask, kw("-x86")));
}

#[test]
fn known_arches() {
	let (_dir, repo) = nattka_rs_test_utils::open_fixture().expect("failed to open fixture");
	assert_eq!(repo.known_arches(), kw("alpha amd64 arm64 hppa x86").as_slice());
	assert_eq!(repo.profiles().len(), 4);
}
