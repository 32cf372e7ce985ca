//! Various helper functions for testing
//!
//! functions in this module should use results and not use any panics to avoid confusion in callers

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;

use nattka_rs::bug::{BugQuery, BugUpdate};
use nattka_rs::checker::CheckResult;
use nattka_rs::git::WorkTree;
use nattka_rs::repository::EbuildRepository;
use nattka_rs::{BugRecord, BugTracker, DependencyChecker};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("copy error: {0}")]
	FsExtra(#[from] fs_extra::error::Error),
	#[error(transparent)]
	NattkaRs(#[from] nattka_rs::Error),
	#[error("git error: {0}")]
	Git(String),
}

/// Location of the fixture repository shipped with the library crate.
pub fn fixture_path() -> PathBuf {
	PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../nattka-rs-lib/test-data/repo")
}

/// Copies the fixture repository into a fresh temporary directory.
///
/// The directory is removed when the returned handle is dropped.
pub fn copy_fixture() -> Result<tempfile::TempDir, Error> {
	let dir = tempfile::tempdir()?;
	let mut options = fs_extra::dir::CopyOptions::new();
	options.content_only = true;
	fs_extra::dir::copy(fixture_path(), dir.path(), &options)?;
	Ok(dir)
}

/// A private copy of the fixture repository, opened.
pub fn open_fixture() -> Result<(tempfile::TempDir, EbuildRepository), Error> {
	let dir = copy_fixture()?;
	let repo = EbuildRepository::open(dir.path())?;
	Ok((dir, repo))
}

fn git(dir: &Path, args: &[&str]) -> Result<(), Error> {
	let output = Command::new("git").args(args).current_dir(dir).output()?;
	if !output.status.success() {
		return Err(Error::Git(format!("git {}: {}", args.join(" "), String::from_utf8_lossy(&output.stderr).trim())));
	}
	Ok(())
}

/// Turns `dir` into a git repository with everything committed.
pub fn git_init(dir: &Path) -> Result<(), Error> {
	git(dir, &["init", "-q"])?;
	git(dir, &["config", "user.name", "Test User"])?;
	git(dir, &["config", "user.email", "test@example.com"])?;
	git(dir, &["config", "commit.gpgsign", "false"])?;
	git(dir, &["add", "-A"])?;
	git(dir, &["commit", "-q", "-m", "initial"])?;
	Ok(())
}

/// Subjects of all commits in `dir`, newest first.
pub fn git_log(dir: &Path) -> Result<Vec<String>, Error> {
	let output = Command::new("git").args(["log", "--format=%s"]).current_dir(dir).output()?;
	if !output.status.success() {
		return Err(Error::Git(String::from_utf8_lossy(&output.stderr).trim().to_string()));
	}
	Ok(String::from_utf8_lossy(&output.stdout).lines().map(|l| l.to_string()).collect())
}

fn read_tree(path: &Path) -> Result<BTreeMap<PathBuf, Vec<u8>>, Error> {
	let content = fs_extra::dir::get_dir_content(path)?;
	let mut out = BTreeMap::new();
	for file in content.files {
		let file = PathBuf::from(file);
		out.insert(file.clone(), std::fs::read(&file)?);
	}
	Ok(out)
}

fn io_error(e: Error) -> nattka_rs::Error {
	match e {
		Error::IO(e) => nattka_rs::Error::IO(e),
		Error::NattkaRs(e) => e,
		e => nattka_rs::Error::IO(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
	}
}

/// Work tree without version control, reset restores the files present at creation.
#[derive(Debug)]
pub struct SnapshotWorkTree {
	path: PathBuf,
	files: BTreeMap<PathBuf, Vec<u8>>,
	pub resets: usize,
}

impl SnapshotWorkTree {
	pub fn new(path: impl AsRef<Path>) -> Result<Self, Error> {
		let path = path.as_ref().to_path_buf();
		let files = read_tree(&path)?;
		Ok(Self { path, files, resets: 0 })
	}
}

impl WorkTree for SnapshotWorkTree {
	fn path(&self) -> &Path {
		&self.path
	}

	fn is_dirty(&self) -> nattka_rs::Result<bool> {
		Ok(read_tree(&self.path).map_err(io_error)? != self.files)
	}

	fn reset(&mut self) -> nattka_rs::Result<()> {
		self.resets += 1;
		for (file, data) in &self.files {
			std::fs::write(file, data)?;
		}
		Ok(())
	}
}

/// In-memory bug tracker recording everything done to it.
#[derive(Debug, Default)]
pub struct FakeTracker {
	pub bugs: RefCell<BTreeMap<u64, BugRecord>>,
	/// Comments posted by us, per bug.
	pub comments: RefCell<BTreeMap<u64, Vec<String>>>,
	pub updates: RefCell<Vec<(u64, BugUpdate)>>,
	/// `(bug, uncc, comment, closed)`
	pub resolutions: RefCell<Vec<(u64, Vec<String>, String, bool)>>,
	/// Makes every update fail.
	pub fail_updates: Cell<bool>,
}

impl FakeTracker {
	pub fn new(bugs: impl IntoIterator<Item = BugRecord>) -> Self {
		let tracker = Self::default();
		tracker.bugs.borrow_mut().extend(bugs.into_iter().map(|b| (b.id, b)));
		tracker
	}

	pub fn add_comment(&self, id: u64, comment: impl Into<String>) {
		self.comments.borrow_mut().entry(id).or_default().push(comment.into());
	}

	pub fn bug(&self, id: u64) -> Option<BugRecord> {
		self.bugs.borrow().get(&id).cloned()
	}
}

impl BugTracker for FakeTracker {
	fn find_bugs(&self, query: &BugQuery) -> nattka_rs::Result<BTreeMap<u64, BugRecord>> {
		Ok(self.bugs.borrow().iter()
			.filter(|(id, _)| query.bugs.is_empty() || query.bugs.contains(id))
			.filter(|(_, b)| query.categories.is_empty() || b.category.is_some_and(|c| query.categories.contains(&c)))
			.filter(|(_, b)| query.cc.iter().all(|c| b.cc.contains(c)))
			.filter(|(_, b)| !query.unresolved || !b.resolved)
			.filter(|(_, b)| query.sanity_check.is_empty() || b.sanity_check.is_some_and(|s| query.sanity_check.contains(&s)))
			.map(|(id, b)| (*id, b.clone()))
			.collect())
	}

	fn latest_own_comment(&self, id: u64) -> nattka_rs::Result<Option<String>> {
		Ok(self.comments.borrow().get(&id).and_then(|c| c.last().cloned()))
	}

	fn update_status(&self, id: u64, update: &BugUpdate) -> nattka_rs::Result<()> {
		if self.fail_updates.get() {
			return Err(nattka_rs::Error::Bugzilla("update refused".to_string()));
		}
		if let Some(b) = self.bugs.borrow_mut().get_mut(&id) {
			b.sanity_check = update.sanity_check;
			b.cc.extend(update.cc_add.iter().cloned());
			b.keywords.retain(|k| !update.keywords_remove.contains(k));
			b.keywords.extend(update.keywords_add.iter().cloned());
			if let Some(list) = &update.new_package_list {
				b.atoms = list.clone();
			}
		}
		if let Some(c) = &update.comment {
			self.add_comment(id, c.clone());
		}
		self.updates.borrow_mut().push((id, update.clone()));
		Ok(())
	}

	fn resolve_bug(&self, id: u64, uncc: &[String], comment: &str, close: bool) -> nattka_rs::Result<()> {
		if let Some(b) = self.bugs.borrow_mut().get_mut(&id) {
			b.cc.retain(|c| !uncc.contains(c));
			b.resolved |= close;
		}
		self.add_comment(id, comment);
		self.resolutions.borrow_mut().push((id, uncc.to_vec(), comment.to_string(), close));
		Ok(())
	}
}

/// Checker answering from a queue of prepared results, success once it runs out.
#[derive(Debug, Default)]
pub struct FakeChecker {
	pub results: RefCell<VecDeque<CheckResult>>,
	/// `(keywords, atoms)` of every call.
	pub calls: RefCell<Vec<(Vec<String>, Vec<String>)>>,
}

impl FakeChecker {
	pub fn new(results: impl IntoIterator<Item = CheckResult>) -> Self {
		Self { results: RefCell::new(results.into_iter().collect()), calls: Default::default() }
	}

	pub fn call_count(&self) -> usize {
		self.calls.borrow().len()
	}
}

impl DependencyChecker for FakeChecker {
	fn check(&self, keywords: &[String], atoms: &[String]) -> nattka_rs::Result<CheckResult> {
		self.calls.borrow_mut().push((keywords.to_vec(), atoms.to_vec()));
		Ok(self.results.borrow_mut().pop_front().unwrap_or_default())
	}
}

/// A bug as the tracker would return it, CC-ing `cc`.
pub fn bug(id: u64, category: Option<nattka_rs::BugCategory>, atoms: &str, cc: &[&str]) -> BugRecord {
	let mut b = BugRecord::new(id, category, atoms);
	b.cc = cc.iter().map(|c| c.to_string()).collect();
	b.assigned_to = "test@example.com".to_string();
	b
}
