//! Checking through `pkgcheck scan`.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::{CheckIssue, CheckResult, DependencyChecker};

/// Runs the `VisibilityCheck` of pkgcheck against a repository.
#[derive(Debug, Clone)]
pub struct Pkgcheck {
	repo: PathBuf,
	profiles: String,
	program: String,
}

impl Pkgcheck {
	pub fn new(repo: impl AsRef<Path>, profiles: impl Into<String>) -> Self {
		Self {
			repo: repo.as_ref().to_path_buf(),
			profiles: profiles.into(),
			program: "pkgcheck".to_string(),
		}
	}

	/// Uses another executable in place of `pkgcheck`.
	pub fn with_program(mut self, program: impl Into<String>) -> Self {
		self.program = program.into();
		self
	}
}

/// Picks the dependency failures of `atoms` out of `JsonStream` output.
/// 
/// pkgcheck may report on other versions of the same package, those are dropped.
pub fn parse_json_stream(output: &str, atoms: &[String]) -> crate::Result<Vec<CheckIssue>> {
	let mut issues = Vec::new();
	for line in output.lines().filter(|l| !l.trim().is_empty()) {
		let value: serde_json::Value = serde_json::from_str(line)?;
		let class = value.get("__class__").and_then(|c| c.as_str()).unwrap_or_default();
		if !class.starts_with("NonsolvableDeps") {
			continue;
		}
		let issue: CheckIssue = serde_json::from_value(value)?;
		if atoms.iter().any(|a| *a == format!("={}", issue.cpv())) {
			issues.push(issue);
		}
	}
	Ok(issues)
}

impl DependencyChecker for Pkgcheck {
	fn check(&self, keywords: &[String], atoms: &[String]) -> crate::Result<CheckResult> {
		let output = Command::new(&self.program)
			.args(["scan", "-c", "VisibilityCheck", "-p", &self.profiles, "-a", &keywords.join(",")])
			.arg("-r").arg(&self.repo)
			.args(["-R", "JsonStream"])
			.args(atoms)
			.output()
			.map_err(|e| crate::Error::Checker(format!("unable to run {}: {}", self.program, e)))?;

		/* 1 means results were found */
		if !output.status.success() && output.status.code() != Some(1) {
			return Err(crate::Error::Checker(String::from_utf8_lossy(&output.stderr).trim().to_string()));
		}

		let issues = parse_json_stream(&String::from_utf8_lossy(&output.stdout), atoms)?;
		Ok(CheckResult { success: issues.is_empty(), issues })
	}
}
