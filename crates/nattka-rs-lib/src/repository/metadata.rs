//! Minimal `metadata.xml` reader.
//! 
//! Only maintainer addresses and `<stabilize-allarches/>` are of interest here.

use std::path::Path;

use regex::Regex;

use super::candidate::PackageMetadata;

/// Reads `metadata.xml` from a package directory, a missing file yields empty metadata.
pub fn load_metadata(package_dir: impl AsRef<Path>) -> crate::Result<PackageMetadata> {
	let path = package_dir.as_ref().join("metadata.xml");
	match std::fs::read_to_string(&path) {
		Ok(data) => parse_metadata(&data)
			.map_err(|e| crate::Error::Parse(format!("{}: {}", path.display(), e))),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PackageMetadata::default()),
		Err(e) => Err(e.into()),
	}
}

pub fn parse_metadata(data: &str) -> Result<PackageMetadata, String> {
	let comments = Regex::new(r"(?s)<!--.*?-->").expect("static regex");
	let data = comments.replace_all(data, "");

	if !data.contains("<pkgmetadata") {
		return Err("no <pkgmetadata> element".to_string());
	}

	let maintainer = Regex::new(r"(?s)<maintainer\b[^>]*>(.*?)</maintainer>").expect("static regex");
	let email = Regex::new(r"(?s)<email>\s*(.*?)\s*</email>").expect("static regex");
	let maintainers = maintainer.captures_iter(&data)
		.filter_map(|m| email.captures(&m[1]).map(|e| e[1].to_string()))
		.collect();

	let allarches = Regex::new(r#"<stabilize-allarches\b([^>]*?)/?>"#).expect("static regex");
	let restrict = Regex::new(r#"\brestrict\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static regex");
	let stabilize_allarches = allarches.captures_iter(&data)
		.map(|m| restrict.captures(&m[1]).and_then(|r| r.get(1).or_else(|| r.get(2))).map(|r| unescape(r.as_str())))
		.collect();

	Ok(PackageMetadata { maintainers, stabilize_allarches })
}

fn unescape(s: &str) -> String {
	s.replace("&lt;", "<").replace("&gt;", ">").replace("&quot;", "\"").replace("&apos;", "'").replace("&amp;", "&")
}

#[cfg(test)]
mod test {
	use super::*;

	const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE pkgmetadata SYSTEM "https://www.gentoo.org/dtd/metadata.dtd">
<pkgmetadata>
	<maintainer type="person">
		<email>dev@gentoo.org</email>
		<name>Dev</name>
	</maintainer>
	<!-- <maintainer><email>old@gentoo.org</email></maintainer> -->
	<maintainer type="project"><email>proj@gentoo.org</email></maintainer>
	<stabilize-allarches restrict="&gt;=test/foo-2"/>
</pkgmetadata>
"#;

	#[test]
	fn maintainers() { assert_eq!(parse_metadata(SAMPLE).unwrap().maintainers, vec!["dev@gentoo.org", "proj@gentoo.org"]); }
	#[test]
	fn allarches_restrict() { assert_eq!(parse_metadata(SAMPLE).unwrap().stabilize_allarches, vec![Some(">=test/foo-2".to_string())]); }
	#[test]
	fn allarches_plain() {
		let m = parse_metadata("<pkgmetadata><stabilize-allarches/></pkgmetadata>").unwrap();
		assert_eq!(m.stabilize_allarches, vec![None]);
	}
	#[test]
	fn malformed() { assert!(parse_metadata("garbage").is_err()); }
}
