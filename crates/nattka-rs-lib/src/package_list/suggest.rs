//! Keyword inference for `*` and for packages listed without keywords.

use std::collections::BTreeSet;

use crate::keyword::{bare_keyword, filter_prefix_keywords};
use crate::repository::{PackageCandidate, Repository};

/// Arches `pkg` could reasonably get, judging by its sibling versions.
/// 
/// For stabilization only arches `pkg` is `~arch` on are considered, for
/// keywording only arches it has no keyword for at all. Prefix arches are never suggested.
pub fn suggested_keywords(repo: &dyn Repository, pkg: &PackageCandidate, stablereq: bool) -> crate::Result<BTreeSet<String>> {
	let siblings = repo.package_versions(&pkg.key())?;
	let mut keywords: BTreeSet<String> = siblings.iter()
		.flat_map(|p| p.keywords.iter())
		.filter(|k| !k.starts_with('-'))
		.map(|k| bare_keyword(k).to_string())
		.collect();

	if stablereq {
		let testing: BTreeSet<&str> = pkg.keywords.iter()
			.filter_map(|k| k.strip_prefix('~'))
			.collect();
		keywords.retain(|k| testing.contains(k.as_str()));
	} else {
		for k in &pkg.keywords {
			keywords.remove(bare_keyword(k));
		}
	}

	Ok(filter_prefix_keywords(&keywords))
}
