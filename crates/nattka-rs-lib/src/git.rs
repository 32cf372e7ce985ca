//! Git working tree handling.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn run_git(dir: &Path, args: &[&str]) -> crate::Result<Output> {
	Command::new("git")
		.args(args)
		.current_dir(dir)
		.output()
		.map_err(|e| crate::Error::Git(format!("unable to run git: {}", e)))
}

/// Top-level directory of the work tree containing `path`, if any.
pub fn git_toplevel(path: &Path) -> Option<PathBuf> {
	let output = run_git(path, &["rev-parse", "--show-toplevel"]).ok()?;
	if !output.status.success() {
		return None;
	}
	Some(PathBuf::from(String::from_utf8_lossy(&output.stdout).trim()))
}

/// Whether a checkout would overwrite changes in the work tree.
pub fn git_is_dirty(path: &Path) -> crate::Result<bool> {
	Ok(!run_git(path, &["diff-files", "--quiet"])?.status.success())
}

/// Reverts every unstaged change.
pub fn git_reset_changes(path: &Path) -> crate::Result<()> {
	let top = git_toplevel(path).ok_or(crate::Error::GitRepositoryNotFound)?;
	let output = run_git(&top, &["checkout", "-q", "."])?;
	if !output.status.success() {
		return Err(crate::Error::Git(format!("git checkout failed: {}", String::from_utf8_lossy(&output.stderr).trim())));
	}
	Ok(())
}

/// Commits `files` (relative to the top-level directory) with a sign-off.
/// 
/// Returns the summary printed by git.
pub fn git_commit(path: &Path, message: &str, files: &[String]) -> crate::Result<String> {
	let top = git_toplevel(path).ok_or(crate::Error::GitRepositoryNotFound)?;
	let mut args = vec!["commit", "-s", "-m", message];
	args.extend(files.iter().map(String::as_str));
	let output = run_git(&top, &args)?;
	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	if !output.status.success() {
		if stdout.contains("nothing to commit") || stdout.contains("no changes added to commit") {
			return Err(crate::Error::GitCommitNoChanges);
		}
		return Err(crate::Error::Git(format!("git commit failed: {}", String::from_utf8_lossy(&output.stderr).trim())));
	}
	Ok(stdout)
}

/// A working copy that can be modified and rolled back.
pub trait WorkTree {
	fn path(&self) -> &Path;
	fn is_dirty(&self) -> crate::Result<bool>;
	/// Discards every modification.
	fn reset(&mut self) -> crate::Result<()>;
}

#[derive(Debug, Clone)]
pub struct GitWorkTree {
	path: PathBuf,
}

impl GitWorkTree {
	pub fn open(repo_path: impl AsRef<Path>) -> crate::Result<Self> {
		let path = git_toplevel(repo_path.as_ref()).ok_or(crate::Error::GitRepositoryNotFound)?;
		Ok(Self { path })
	}
}

impl WorkTree for GitWorkTree {
	fn path(&self) -> &Path {
		&self.path
	}

	fn is_dirty(&self) -> crate::Result<bool> {
		git_is_dirty(&self.path)
	}

	fn reset(&mut self) -> crate::Result<()> {
		git_reset_changes(&self.path)
	}
}

/// Exclusive use of a clean work tree.
/// 
/// Every change is reset when the guard is released or dropped.
pub struct WorkTreeGuard<'a> {
	tree: &'a mut dyn WorkTree,
	released: bool,
}

impl<'a> WorkTreeGuard<'a> {
	/// Fails with `GitDirtyWorkTree` if the tree has uncommitted changes.
	pub fn acquire(tree: &'a mut dyn WorkTree) -> crate::Result<Self> {
		if tree.is_dirty()? {
			return Err(crate::Error::GitDirtyWorkTree(tree.path().to_path_buf()));
		}
		Ok(Self { tree, released: false })
	}

	pub fn path(&self) -> &Path {
		self.tree.path()
	}

	/// Resets the tree, reporting failure.
	pub fn release(mut self) -> crate::Result<()> {
		self.released = true;
		self.tree.reset()
	}
}

impl Drop for WorkTreeGuard<'_> {
	fn drop(&mut self) {
		if self.released {
			return;
		}
		if let Err(e) = self.tree.reset() {
			log::error!("Failed to reset {}: {}", self.tree.path().display(), e);
		}
	}
}
