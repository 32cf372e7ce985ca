//! Repository `profiles/` directory: known arches, profiles and package masks.

use std::path::{Path, PathBuf};

use super::atom::Atom;

#[derive(Debug, Clone)]
pub struct Profile {
	pub arch: String,
	/// Path relative to `profiles/`.
	pub path: String,
	/// `stable`, `dev` or `exp`.
	pub status: String,
	/// Masks from the profile and its parents, not including the repository-wide ones.
	pub masks: Vec<Atom>,
}

/// Reads a line based file, dropping comments and blank lines.
/// 
/// A missing file reads as empty.
pub(crate) fn read_lines(path: impl AsRef<Path>) -> crate::Result<Vec<String>> {
	let data = match std::fs::read_to_string(path.as_ref()) {
		Ok(d) => d,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => return Err(e.into()),
	};
	Ok(data.lines()
		.map(|l| l.split('#').next().unwrap_or_default().trim())
		.filter(|l| !l.is_empty())
		.map(|l| l.to_string())
		.collect())
}

/// Reads `profiles/arch.list`.
pub fn load_known_arches(repo: impl AsRef<Path>) -> crate::Result<Vec<String>> {
	read_lines(repo.as_ref().join("profiles").join("arch.list"))
}

/// Applies a `package.mask` file on top of `masks`.
/// 
/// `-atom` lines lift a mask set earlier in the stack.
pub fn apply_mask_file(masks: &mut Vec<Atom>, path: impl AsRef<Path>) -> crate::Result<()> {
	let path = path.as_ref();
	/* package.mask may also be a directory of files */
	let files = if path.is_dir() {
		let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
			.filter_map(|e| e.ok())
			.map(|e| e.path())
			.filter(|p| p.is_file() && !p.file_name().map_or(true, |n| n.to_string_lossy().starts_with('.')))
			.collect();
		files.sort();
		files
	} else {
		vec![path.to_path_buf()]
	};

	for file in files {
		for line in read_lines(&file)? {
			if let Some(unmask) = line.strip_prefix('-') {
				let unmask = Atom::parse(unmask)?;
				masks.retain(|m| *m != unmask);
			} else {
				match Atom::parse(&line) {
					Ok(a) => masks.push(a),
					Err(e) => log::warn!("{}: ignoring mask entry: {}", file.display(), e),
				}
			}
		}
	}
	Ok(())
}

/// Collects masks of the profile at `dir`, parents first.
fn stack_profile_masks(dir: &Path, masks: &mut Vec<Atom>, depth: usize) -> crate::Result<()> {
	if depth > 32 {
		return Err(crate::Error::Parse(format!("profile inheritance too deep at {}", dir.display())));
	}
	for parent in read_lines(dir.join("parent"))? {
		/* repo:path references into other repositories are not followed */
		if parent.contains(':') {
			log::debug!("{}: skipping external parent {}", dir.display(), parent);
			continue;
		}
		stack_profile_masks(&dir.join(parent), masks, depth + 1)?;
	}
	apply_mask_file(masks, dir.join("package.mask"))
}

/// Loads all profiles listed in `profiles/profiles.desc`.
pub fn load_profiles(repo: impl AsRef<Path>) -> crate::Result<Vec<Profile>> {
	let profiles_dir = repo.as_ref().join("profiles");
	let mut out = Vec::new();

	for line in read_lines(profiles_dir.join("profiles.desc"))? {
		let fields: Vec<&str> = line.split_whitespace().collect();
		let [arch, path, status] = fields[..] else {
			log::warn!("malformed profiles.desc line: {}", line);
			continue;
		};
		let mut masks = Vec::new();
		stack_profile_masks(&profiles_dir.join(path), &mut masks, 0)?;
		out.push(Profile { arch: arch.to_string(), path: path.to_string(), status: status.to_string(), masks });
	}

	Ok(out)
}
