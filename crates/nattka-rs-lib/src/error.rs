//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("parsing error: {0}")]
	Parse(String),
	#[error("configuration error: {0}")]
	Config(String),
	#[error("bugzilla error: {0}")]
	Bugzilla(String),
	#[error("git error: {0}")]
	Git(String),
	/// Uncommitted changes were found where a clean tree is required.
	#[error("working tree is dirty: {0}")]
	GitDirtyWorkTree(std::path::PathBuf),
	#[error("not a git repository")]
	GitRepositoryNotFound,
	#[error("no changes to commit")]
	GitCommitNoChanges,
	#[error("KEYWORDS not found in {0}")]
	KeywordsNotFound(std::path::PathBuf),
	#[error("checker failed: {0}")]
	Checker(String),
	#[error("package not found: {0}")]
	PackageNotFound(String),
	#[error(transparent)]
	Match(#[from] crate::package_list::MatchError),
}
