//! Access to an ebuild repository.
//! 
//! [`Repository`] is what the rest of the crate works against, [`EbuildRepository`]
//! implements it on top of an on-disk tree.

pub mod version;
pub mod atom;
pub mod depend;
mod candidate;
pub mod profiles;
pub mod metadata;
mod ebuild_tree;

pub use version::PackageVersion;
pub use atom::Atom;
pub use depend::{DepType, DepNode};
pub use candidate::{PackageCandidate, PackageMetadata, select_best_version};
pub use profiles::Profile;
pub use ebuild_tree::{EbuildRepository, find_repository};

use std::path::Path;

/// Why a package cannot be acted upon, see [`Repository::mask_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskReason {
	NoMask,
	/// `-arch` or `-*` in the version's own `KEYWORDS`.
	KeywordMask,
	/// Listed in `profiles/package.mask`.
	RepositoryMask,
	/// Masked by every profile of a requested arch.
	ProfileMask,
}

pub trait Repository {
	/// Top directory of the repository.
	fn location(&self) -> &Path;

	/// Arches from `profiles/arch.list`.
	fn known_arches(&self) -> &[String];

	/// All versions matching `atom`, in no particular order.
	fn match_atom(&self, atom: &Atom) -> crate::Result<Vec<PackageCandidate>>;

	/// Repository-wide masks.
	fn repository_masks(&self) -> &[Atom];

	fn profiles(&self) -> &[Profile];

	/// Adds `keywords` (stable or `~arch`) to the ebuild behind `pkg`.
	fn apply_keywords(&self, pkg: &PackageCandidate, keywords: &[String], stable: bool) -> crate::Result<()>;

	/// All versions of `category/package`.
	fn package_versions(&self, key: &str) -> crate::Result<Vec<PackageCandidate>> {
		self.match_atom(&Atom::parse(key)?)
	}

	fn is_known_arch(&self, arch: &str) -> bool {
		self.known_arches().iter().any(|a| a == arch)
	}

	/// Checks whether `pkg` is unusable for all of `arches`.
	/// 
	/// Keyword masks are checked first, then repository masks, then profile masks.
	/// The returned list holds the offending `-arch` keywords for keyword masks
	/// and the affected arches for profile masks.
	fn mask_status(&self, pkg: &PackageCandidate, arches: &[String]) -> (MaskReason, Vec<String>) {
		let masked = pkg.keyword_masked(arches);
		if !masked.is_empty() {
			return (MaskReason::KeywordMask, masked);
		}

		let repo_masks = self.repository_masks();
		if repo_masks.iter().any(|m| m.matches(pkg)) {
			return (MaskReason::RepositoryMask, Vec::new());
		}

		let mut masked_arches = Vec::new();
		for arch in arches {
			let profiles: Vec<&Profile> = self.profiles().iter().filter(|p| p.arch == *arch).collect();
			if profiles.is_empty() {
				continue;
			}
			let all_masked = profiles.iter().all(|p| {
				p.masks.iter()
					.filter(|m| !repo_masks.contains(m))
					.any(|m| m.matches(pkg))
			});
			if all_masked {
				masked_arches.push(arch.clone());
			}
		}
		masked_arches.sort();

		if masked_arches.is_empty() {
			(MaskReason::NoMask, Vec::new())
		} else {
			(MaskReason::ProfileMask, masked_arches)
		}
	}
}
