//! Keyword list handling: ordering, merging and rewriting `KEYWORDS` in ebuilds.
//! 
//! Keywords are kept as plain strings (`amd64`, `~amd64`, `-amd64`, `-*`).

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

/// Strips the stability marker (`~` or `-`) off a keyword.
pub fn bare_keyword(kw: &str) -> &str {
	kw.trim_start_matches(['-', '~'])
}

/// Sorting key for keywords, orders by OS suffix first and then by arch name.
/// 
/// Keywords without an OS suffix (`amd64`) sort before prefix keywords (`amd64-linux`).
pub fn keyword_sort_key(kw: &str) -> (&str, &str, &str) {
	let kw = bare_keyword(kw);
	match kw.split_once('-') {
		Some((arch, os)) => (os, "-", arch),
		None => ("", "", kw),
	}
}

pub fn sort_keywords(keywords: &mut [String]) {
	keywords.sort_by(|a, b| keyword_sort_key(a).cmp(&keyword_sort_key(b)));
}

/// Returns a sorted copy of `keywords`.
pub fn sorted_keywords<'a>(keywords: impl IntoIterator<Item = &'a String>) -> Vec<String> {
	let mut v: Vec<String> = keywords.into_iter().cloned().collect();
	sort_keywords(&mut v);
	v
}

/// Drops prefix keywords (the ones carrying an OS suffix).
pub fn filter_prefix_keywords<'a>(keywords: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
	keywords.into_iter()
		.filter(|k| !k.contains('-'))
		.cloned()
		.collect()
}

/// Adds `new_keywords` to `keywords`.
/// 
/// Stable keywords replace `~arch` and `-arch`, testing keywords only replace `-arch`
/// and never downgrade an existing stable keyword.
/// 
/// Returns the updated sorted list or `None` when nothing changed.
pub fn update_keywords<'a>(keywords: &[String], new_keywords: impl IntoIterator<Item = &'a String>, stable: bool) -> Option<Vec<String>> {
	let original: BTreeSet<&str> = keywords.iter().map(|k| k.as_str()).collect();
	let mut kw: BTreeSet<String> = keywords.iter().cloned().collect();

	for k in new_keywords {
		kw.insert(if stable { k.clone() } else { format!("~{}", k) });
	}
	for k in kw.iter().cloned().collect::<Vec<_>>() {
		kw.remove(&format!("-{}", k.trim_start_matches('~')));
		kw.remove(&format!("~{}", k));
	}

	if kw.iter().map(|k| k.as_str()).collect::<BTreeSet<_>>() == original {
		None
	} else {
		let mut v: Vec<String> = kw.into_iter().collect();
		sort_keywords(&mut v);
		Some(v)
	}
}

/// Bumps the copyright year range and owner of an ebuild header line.
/// 
/// `# Copyright 2012 Gentoo Foundation` becomes `# Copyright 2012-<year> Gentoo Authors`.
pub fn update_copyright(line: &str, target_year: i32) -> String {
	let re = regex::Regex::new(r"^(.*\bCopyright )((?:[0-9]{4}-)?)([0-9]{4})( Gentoo (?:Foundation|Authors)\b)(.*)$")
		.expect("static regex");
	let (body, newline) = match line.strip_suffix('\n') {
		Some(b) => (b, "\n"),
		None => (line, ""),
	};
	let Some(c) = re.captures(body) else {
		return line.to_string();
	};

	let year = target_year.to_string();
	let mut y1 = c[2].to_string();
	if y1.is_empty() && c[3] != *year {
		y1 = format!("{}-", &c[3]);
	}
	let owner = if &c[4] == " Gentoo Foundation" { " Gentoo Authors" } else { &c[4] };
	format!("{}{}{}{}{}{}", &c[1], y1, year, owner, &c[5], newline)
}

/// A `KEYWORDS=` assignment located inside a single line.
struct KeywordsLine<'a> {
	pre: &'a str,
	quote: &'a str,
	keywords: &'a str,
	post: &'a str,
}

fn find_keywords_line(line: &str) -> Option<KeywordsLine> {
	let re = regex::Regex::new(r"^[^#]*\bKEYWORDS=").expect("static regex");
	let m = re.find(line)?;
	let (pre, rest) = line.split_at(m.end());
	let rest = rest.trim_end_matches('\n');

	match rest.chars().next() {
		Some(q @ ('"' | '\'')) => {
			let inner = &rest[1..];
			/* closing quote must be on the same line */
			let end = inner.find(q)?;
			Some(KeywordsLine { pre, quote: &rest[..1], keywords: &inner[..end], post: &inner[end..] })
		},
		_ => Some(KeywordsLine { pre, quote: "", keywords: rest, post: "" }),
	}
}

/// Updates `KEYWORDS` in the ebuild at `path`, see [`update_keywords`].
/// 
/// Also bumps the copyright line when the file is rewritten.
/// Returns whether the file was modified.
/// 
/// # Errors
/// - `Error::KeywordsNotFound` when the file has no single-line `KEYWORDS` assignment.
pub fn update_keywords_in_file<'a>(path: impl AsRef<Path>, keywords: impl IntoIterator<Item = &'a String>, stable: bool) -> crate::Result<bool> {
	let path = path.as_ref();
	let keywords: Vec<&String> = keywords.into_iter().collect();
	let data = std::fs::read_to_string(path)?;
	let mut lines: Vec<String> = data.split_inclusive('\n').map(|l| l.to_string()).collect();

	let mut found = None;
	for (i, l) in lines.iter().enumerate() {
		if let Some(m) = find_keywords_line(l) {
			let current: Vec<String> = m.keywords.split_whitespace().map(|s| s.to_string()).collect();
			let Some(kw) = update_keywords(&current, keywords.iter().copied(), stable) else {
				return Ok(false);
			};
			let quote = if m.quote.is_empty() { "\"" } else { m.quote };
			let post = if m.quote.is_empty() { "\"" } else { m.post };
			found = Some((i, format!("{}{}{}{}\n", m.pre, quote, kw.join(" "), post)));
			break;
		}
	}
	let Some((i, line)) = found else {
		return Err(crate::Error::KeywordsNotFound(path.to_path_buf()));
	};
	lines[i] = line;

	use chrono::Datelike;
	lines[0] = update_copyright(&lines[0], chrono::Utc::now().year());

	let dir = path.parent().unwrap_or_else(|| Path::new("."));
	let mut f = tempfile::NamedTempFile::new_in(dir)?;
	f.write_all(lines.concat().as_bytes())?;
	f.persist(path).map_err(|e| e.error)?;

	log::debug!("Updated keywords in {}", path.display());
	Ok(true)
}

#[cfg(test)]
mod test {
	use super::*;

	fn kw(s: &str) -> Vec<String> {
		s.split_whitespace().map(|s| s.to_string()).collect()
	}

	#[test]
	fn sort_by_os_then_arch() {
		let mut v = kw("~x86-linux amd64 ~amd64-linux -alpha ~hppa");
		sort_keywords(&mut v);
		assert_eq!(v, kw("-alpha amd64 ~hppa ~amd64-linux ~x86-linux"));
	}
	#[test]
	fn prefix_filtered() { assert_eq!(filter_prefix_keywords(&kw("amd64 x86-linux")), ["amd64".to_string()].into()); }
	#[test]
	fn stable_replaces_testing() { assert_eq!(update_keywords(&kw("~amd64 ~x86"), &kw("amd64"), true), Some(kw("amd64 ~x86"))); }
	#[test]
	fn testing_replaces_negative() { assert_eq!(update_keywords(&kw("-amd64 ~x86"), &kw("amd64"), false), Some(kw("~amd64 ~x86"))); }
	#[test]
	fn testing_never_downgrades() { assert_eq!(update_keywords(&kw("amd64"), &kw("amd64"), false), None); }
	#[test]
	fn no_change_is_none() { assert_eq!(update_keywords(&kw("amd64 x86"), &kw("x86"), true), None); }
	#[test]
	fn negative_star_kept() { assert_eq!(update_keywords(&kw("-*"), &kw("amd64"), false), Some(kw("-* ~amd64"))); }

	#[test]
	fn copyright_single_year() {
		assert_eq!(update_copyright("# Copyright 2012 Gentoo Foundation\n", 2020), "# Copyright 2012-2020 Gentoo Authors\n");
	}
	#[test]
	fn copyright_range() {
		assert_eq!(update_copyright("# Copyright 1999-2019 Gentoo Authors", 2020), "# Copyright 1999-2020 Gentoo Authors");
	}
	#[test]
	fn copyright_current_year() {
		assert_eq!(update_copyright("# Copyright 2020 Gentoo Authors", 2020), "# Copyright 2020 Gentoo Authors");
	}
	#[test]
	fn copyright_other_owner() {
		assert_eq!(update_copyright("# Copyright 2010 Someone Else", 2020), "# Copyright 2010 Someone Else");
	}

	#[test]
	fn keywords_line_quoted() {
		let m = find_keywords_line("KEYWORDS='~amd64 x86' # foo\n").unwrap();
		assert_eq!((m.quote, m.keywords, m.post), ("'", "~amd64 x86", "' # foo"));
	}
	#[test]
	fn keywords_line_conditional() {
		let m = find_keywords_line("[[ ${PV} == 9999 ]] || KEYWORDS=\"~amd64\"\n").unwrap();
		assert_eq!(m.pre, "[[ ${PV} == 9999 ]] || KEYWORDS=");
	}
	#[test]
	fn keywords_line_commented() { assert!(find_keywords_line("#KEYWORDS=\"~amd64\"\n").is_none()); }

	#[test]
	fn file_update() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("foo-1.ebuild");
		std::fs::write(&path, "# Copyright 1999-2019 Gentoo Authors\nEAPI=7\nKEYWORDS=~amd64\nSLOT=0\n").unwrap();
		assert!(update_keywords_in_file(&path, &kw("amd64 x86"), true).unwrap());
		let data = std::fs::read_to_string(&path).unwrap();
		assert!(data.contains("\nKEYWORDS=\"amd64 x86\"\n"));
		assert!(!data.contains("2019 Gentoo"));
	}
	#[test]
	fn file_without_keywords() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("foo-1.ebuild");
		std::fs::write(&path, "EAPI=7\n").unwrap();
		assert!(matches!(update_keywords_in_file(&path, &kw("amd64"), true), Err(crate::Error::KeywordsNotFound(_))));
	}
}
