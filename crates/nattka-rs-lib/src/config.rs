//! Runtime configuration shared by the library and the terminal front-end.

use std::path::PathBuf;
use std::time::Duration;

pub struct Config {
	bugzilla_endpoint: String,
	api_key: Option<String>,
	repo_path: PathBuf,
	cache_path: PathBuf,
	default_arch: Option<String>,
	cache_max_age: Duration,
	race_window: Duration,
	max_comment_len: usize,
	checker_profiles: String,
	unassigned_assignee: String,
	arch_cc_domain: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			bugzilla_endpoint: "https://bugs.gentoo.org/rest".to_string(),
			api_key: None,
			repo_path: PathBuf::from("."),
			cache_path: {
				let path = if let Ok(e) = std::env::var("XDG_CACHE_HOME") {
					PathBuf::from(e)
				} else if let Ok(home) = std::env::var("HOME") {
					PathBuf::from(home).join(".cache")
				} else {
					PathBuf::from(".cache")
				};
				path.join("nattka-rs").join("sanity-check.json")
			},
			default_arch: std::env::var("NATTKA_ARCH").ok().filter(|a| !a.is_empty()),
			cache_max_age: Duration::from_secs(12 * 60 * 60),
			race_window: Duration::from_secs(60),
			max_comment_len: 16384,
			checker_profiles: "stable,dev".to_string(),
			unassigned_assignee: "bug-wranglers@gentoo.org".to_string(),
			arch_cc_domain: "gentoo.org".to_string(),
		}
	}
}

impl Config {
	pub fn bugzilla_endpoint(&self) -> &str {
		&self.bugzilla_endpoint
	}
	pub fn set_bugzilla_endpoint(&mut self, endpoint: impl Into<String>) {
		self.bugzilla_endpoint = endpoint.into();
	}

	pub fn api_key(&self) -> Option<&str> {
		self.api_key.as_deref()
	}
	pub fn set_api_key(&mut self, api_key: Option<String>) {
		self.api_key = api_key;
	}

	/// Returns the configured API key or reads it from `~/.bugz_token`.
	/// 
	/// A missing token file is not an error, the tracker is then used anonymously.
	pub fn load_api_key(&self) -> crate::Result<Option<String>> {
		if let Some(key) = &self.api_key {
			return Ok(Some(key.clone()));
		}
		let home = match std::env::var("HOME") {
			Ok(h) => PathBuf::from(h),
			Err(_) => return Ok(None),
		};
		match std::fs::read_to_string(home.join(".bugz_token")) {
			Ok(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	pub fn repo_path(&self) -> &PathBuf {
		&self.repo_path
	}
	/// returns if the directory is valid or not.
	pub fn set_repo_path(&mut self, repo_path: PathBuf) -> bool {
		if repo_path.is_dir() {
			self.repo_path = repo_path;
			true
		} else {
			false
		}
	}

	pub fn cache_path(&self) -> &PathBuf {
		&self.cache_path
	}
	pub fn set_cache_path(&mut self, cache_path: PathBuf) {
		self.cache_path = cache_path;
	}

	pub fn default_arch(&self) -> Option<&str> {
		self.default_arch.as_deref()
	}
	pub fn set_default_arch(&mut self, arch: Option<String>) {
		self.default_arch = arch;
	}

	pub fn cache_max_age(&self) -> Duration {
		self.cache_max_age
	}
	pub fn set_cache_max_age(&mut self, max_age: Duration) {
		self.cache_max_age = max_age;
	}

	/// Bugs changed more recently than this are left alone in update mode.
	pub fn race_window(&self) -> Duration {
		self.race_window
	}
	pub fn set_race_window(&mut self, race_window: Duration) {
		self.race_window = race_window;
	}

	pub fn max_comment_len(&self) -> usize {
		self.max_comment_len
	}
	pub fn set_max_comment_len(&mut self, len: usize) {
		self.max_comment_len = len;
	}

	pub fn checker_profiles(&self) -> &str {
		&self.checker_profiles
	}
	pub fn set_checker_profiles(&mut self, profiles: impl Into<String>) {
		self.checker_profiles = profiles.into();
	}

	/// Assignee of bugs nobody has picked up yet, arches are never CC-ed on those.
	pub fn unassigned_assignee(&self) -> &str {
		&self.unassigned_assignee
	}

	pub fn arch_cc_domain(&self) -> &str {
		&self.arch_cc_domain
	}

	/// Mail address used to CC an arch team.
	pub fn arch_cc_address(&self, arch: &str) -> String {
		format!("{}@{}", arch, self.arch_cc_domain)
	}
}
