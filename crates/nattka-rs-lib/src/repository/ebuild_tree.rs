//! On-disk ebuild repository.
//! 
//! Ebuilds are read on every lookup, there is no metadata cache. This keeps
//! lookups in line with the working tree when keywords are applied and rolled back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use super::*;

/// Eclasses that make an ebuild a live one.
const LIVE_ECLASSES: [&str; 6] = ["git-r3", "mercurial", "subversion", "bzr", "cvs", "darcs"];

#[derive(Debug)]
pub struct EbuildRepository {
	location: PathBuf,
	known_arches: Vec<String>,
	repository_masks: Vec<Atom>,
	profiles: Vec<Profile>,
}

/// Looks for the repository containing `path`, walking up the directory tree.
/// 
/// A repository is recognised by its `profiles/repo_name` file.
pub fn find_repository(path: impl AsRef<Path>) -> crate::Result<EbuildRepository> {
	let start = path.as_ref().canonicalize()?;
	for dir in start.ancestors() {
		if dir.join("profiles").join("repo_name").is_file() {
			return EbuildRepository::open(dir);
		}
	}
	Err(crate::Error::Config(format!("ebuild repository not found in {}", start.display())))
}

impl EbuildRepository {
	pub fn open(location: impl AsRef<Path>) -> crate::Result<Self> {
		let location = location.as_ref().to_path_buf();
		log::debug!("Loading repository at {}", location.display());

		let known_arches = profiles::load_known_arches(&location)?;
		let mut repository_masks = Vec::new();
		profiles::apply_mask_file(&mut repository_masks, location.join("profiles").join("package.mask"))?;
		let profiles = profiles::load_profiles(&location)?;

		Ok(Self { location, known_arches, repository_masks, profiles })
	}

	/// Reads all versions of a single package.
	fn load_package(&self, category: &str, package: &str) -> crate::Result<Vec<PackageCandidate>> {
		let dir = self.location.join(category).join(package);
		if !dir.is_dir() {
			return Ok(Vec::new());
		}
		let metadata = Arc::new(metadata::load_metadata(&dir)?);

		let mut out = Vec::new();
		for entry in walkdir::WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
			let entry = entry.map_err(|e| crate::Error::IO(e.into()))?;
			let name = entry.file_name().to_string_lossy();
			let Some(stem) = name.strip_suffix(".ebuild") else { continue };
			let Some(ver) = stem.strip_prefix(package).and_then(|s| s.strip_prefix('-')) else {
				log::warn!("{}: file name does not match package", entry.path().display());
				continue;
			};
			let Ok(version) = PackageVersion::new(ver) else {
				log::warn!("{}: invalid version", entry.path().display());
				continue;
			};

			let text = std::fs::read_to_string(entry.path())?;
			let mut pkg = parse_ebuild(&text, category, package, version)
				.map_err(|e| crate::Error::Parse(format!("{}: {}", entry.path().display(), e)))?;
			pkg.path = Some(entry.path().to_path_buf());
			pkg.metadata = metadata.clone();
			out.push(pkg);
		}

		Ok(out)
	}
}

impl Repository for EbuildRepository {
	fn location(&self) -> &Path {
		&self.location
	}

	fn known_arches(&self) -> &[String] {
		&self.known_arches
	}

	fn match_atom(&self, atom: &Atom) -> crate::Result<Vec<PackageCandidate>> {
		Ok(self.load_package(&atom.category, &atom.package)?
			.into_iter()
			.filter(|p| atom.matches(p))
			.collect())
	}

	fn repository_masks(&self) -> &[Atom] {
		&self.repository_masks
	}

	fn profiles(&self) -> &[Profile] {
		&self.profiles
	}

	fn apply_keywords(&self, pkg: &PackageCandidate, keywords: &[String], stable: bool) -> crate::Result<()> {
		let path = pkg.path.as_ref().ok_or_else(|| crate::Error::PackageNotFound(pkg.cpv()))?;
		crate::keyword::update_keywords_in_file(path, keywords, stable)?;
		Ok(())
	}
}

/// Global variable assignments of an ebuild.
/// 
/// Assignments inside functions are skipped, `${VAR}` references to earlier
/// variables are expanded and `+=` appends.
pub(crate) fn read_ebuild_variables(text: &str) -> Result<(HashMap<String, String>, Vec<String>), String> {
	let assign = Regex::new(r"^(?:.*?(?:&&|\|\|)\s*)?(?:export\s+)?([A-Z_][A-Z0-9_]*)(\+?)=(.*)$").expect("static regex");
	let function = Regex::new(r"^[A-Za-z_][A-Za-z0-9_+-]*\s*\(\)").expect("static regex");
	let inherit = Regex::new(r"^\s*inherit\s+(.*)$").expect("static regex");
	let reference = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("static regex");

	let mut vars: HashMap<String, String> = HashMap::new();
	let mut inherited = Vec::new();
	let mut in_function = false;
	let mut lines = text.lines();

	while let Some(line) = lines.next() {
		if in_function {
			if line.starts_with('}') {
				in_function = false;
			}
			continue;
		}
		if function.is_match(line) {
			/* one-line functions close on the same line */
			in_function = !line.trim_end().ends_with('}');
			continue;
		}
		let trimmed = line.trim_start();
		if trimmed.starts_with('#') {
			continue;
		}
		if let Some(c) = inherit.captures(line) {
			inherited.extend(c[1].split('#').next().unwrap_or_default().split_whitespace().map(|s| s.to_string()));
			continue;
		}
		let Some(c) = assign.captures(line) else { continue };
		let name = c[1].to_string();
		let append = !c[2].is_empty();
		let raw = &c[3];

		let value = match raw.chars().next() {
			Some(q @ ('"' | '\'')) => {
				let mut buf = raw[1..].to_string();
				loop {
					if let Some(end) = buf.find(q) {
						buf.truncate(end);
						break;
					}
					match lines.next() {
						Some(l) => { buf.push('\n'); buf.push_str(l); },
						None => return Err(format!("unterminated quote in {}", name)),
					}
				}
				if q == '"' {
					reference.replace_all(&buf, |r: &regex::Captures| {
						let n = r.get(1).or_else(|| r.get(2)).map(|m| m.as_str()).unwrap_or_default();
						vars.get(n).cloned().unwrap_or_default()
					}).into_owned()
				} else {
					buf
				}
			},
			_ => raw.split_whitespace().next().unwrap_or_default().to_string(),
		};

		if append {
			let prev = vars.entry(name).or_default();
			prev.push(' ');
			prev.push_str(&value);
		} else {
			vars.insert(name, value);
		}
	}

	Ok((vars, inherited))
}

/// Builds a candidate from ebuild text.
pub(crate) fn parse_ebuild(text: &str, category: &str, package: &str, version: PackageVersion) -> Result<PackageCandidate, String> {
	let (vars, inherited) = read_ebuild_variables(text)?;
	let words = |name: &str| -> Vec<String> {
		vars.get(name).map(|v| v.split_whitespace().map(|s| s.to_string()).collect()).unwrap_or_default()
	};

	let mut pkg = PackageCandidate::new(category, package, version);
	pkg.eapi = vars.get("EAPI").cloned().unwrap_or_else(|| "0".to_string());
	pkg.set_slot(vars.get("SLOT").map(|s| s.trim()).unwrap_or("0"));
	pkg.keywords = words("KEYWORDS");
	pkg.properties = words("PROPERTIES");
	if inherited.iter().any(|e| LIVE_ECLASSES.contains(&e.as_str())) && !pkg.is_live() {
		pkg.properties.push("live".to_string());
	}
	for dep_type in DepType::ALL {
		if let Some(v) = vars.get(dep_type.variable()) {
			let deps = depend::parse_dependencies(v).map_err(|e| format!("{}: {}", dep_type.variable(), e))?;
			pkg.dependencies.insert(dep_type, deps);
		}
	}

	Ok(pkg)
}
