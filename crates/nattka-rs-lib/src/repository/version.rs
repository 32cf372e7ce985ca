//! Package versions and their ordering.

use std::cmp::Ordering;
use std::fmt::Display;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionSuffix {
	Alpha,
	Beta,
	Pre,
	Rc,
	P,
}

impl VersionSuffix {
	fn from_str(s: &str) -> Option<Self> {
		match s {
			"alpha" => Some(Self::Alpha),
			"beta" => Some(Self::Beta),
			"pre" => Some(Self::Pre),
			"rc" => Some(Self::Rc),
			"p" => Some(Self::P),
			_ => None,
		}
	}
}

/// A version as found in ebuild file names, e.g. `1.2.3b_rc4_p1-r2`.
/// 
/// Ordering follows the package manager rules. Versions that only differ in
/// insignificant zeros (`1.0` and `1.00`) compare equal.
#[derive(Debug, Clone)]
pub struct PackageVersion {
	raw: String,
	numbers: Vec<String>,
	letter: Option<char>,
	suffixes: Vec<(VersionSuffix, String)>,
	revision: String,
}

pub(crate) const VERSION_PATTERN: &str = r"[0-9]+(?:\.[0-9]+)*[a-z]?(?:_(?:alpha|beta|pre|rc|p)[0-9]*)*(?:-r[0-9]+)?";

impl PackageVersion {
	pub fn new(s: &str) -> crate::Result<Self> {
		let re = Regex::new(r"^([0-9]+(?:\.[0-9]+)*)([a-z]?)((?:_(?:alpha|beta|pre|rc|p)[0-9]*)*)(?:-r([0-9]+))?$").expect("static regex");
		let c = re.captures(s).ok_or_else(|| crate::Error::Parse(format!("invalid version: {}", s)))?;

		let numbers = c[1].split('.').map(|n| n.to_string()).collect();
		let letter = c[2].chars().next();
		let suffixes = c[3].split('_')
			.filter(|x| !x.is_empty())
			.map(|x| {
				let split = x.find(|ch: char| ch.is_ascii_digit()).unwrap_or(x.len());
				let (name, num) = x.split_at(split);
				/* The regex only lets known suffix names through */
				(VersionSuffix::from_str(name).unwrap_or(VersionSuffix::P), num.to_string())
			})
			.collect();
		let revision = c.get(4).map(|m| m.as_str().to_string()).unwrap_or_default();

		Ok(Self { raw: s.to_string(), numbers, letter, suffixes, revision })
	}

	pub fn as_str(&self) -> &str {
		&self.raw
	}

	/// Version string without the `-rN` part.
	pub fn without_revision(&self) -> &str {
		match self.raw.rfind("-r") {
			Some(i) if !self.revision.is_empty() => &self.raw[..i],
			_ => &self.raw,
		}
	}

	pub fn revision(&self) -> &str {
		if self.revision.is_empty() { "0" } else { &self.revision }
	}

	/// Compares everything except the revision.
	pub fn cmp_without_revision(&self, other: &Self) -> Ordering {
		cmp_numeric(&self.numbers[0], &other.numbers[0])
			.then_with(|| cmp_components(&self.numbers[1..], &other.numbers[1..]))
			.then_with(|| self.letter.cmp(&other.letter))
			.then_with(|| cmp_suffixes(&self.suffixes, &other.suffixes))
	}
}

/// Compares two decimal strings by value without overflowing.
fn cmp_numeric(a: &str, b: &str) -> Ordering {
	let a = a.trim_start_matches('0');
	let b = b.trim_start_matches('0');
	a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_components(a: &[String], b: &[String]) -> Ordering {
	for (x, y) in a.iter().zip(b.iter()) {
		let ord = if x.starts_with('0') || y.starts_with('0') {
			x.trim_end_matches('0').cmp(y.trim_end_matches('0'))
		} else {
			cmp_numeric(x, y)
		};
		if ord != Ordering::Equal {
			return ord;
		}
	}
	a.len().cmp(&b.len())
}

fn cmp_suffixes(a: &[(VersionSuffix, String)], b: &[(VersionSuffix, String)]) -> Ordering {
	for ((sa, na), (sb, nb)) in a.iter().zip(b.iter()) {
		let ord = sa.cmp(sb).then_with(|| cmp_numeric(na, nb));
		if ord != Ordering::Equal {
			return ord;
		}
	}
	/* An extra `_p` makes a version newer, any other extra suffix older */
	match a.len().cmp(&b.len()) {
		Ordering::Greater => if a[b.len()].0 == VersionSuffix::P { Ordering::Greater } else { Ordering::Less },
		Ordering::Less => if b[a.len()].0 == VersionSuffix::P { Ordering::Less } else { Ordering::Greater },
		Ordering::Equal => Ordering::Equal,
	}
}

impl std::str::FromStr for PackageVersion {
	type Err = crate::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

impl Ord for PackageVersion {
	fn cmp(&self, other: &Self) -> Ordering {
		self.cmp_without_revision(other)
			.then_with(|| cmp_numeric(&self.revision, &other.revision))
	}
}

impl PartialOrd for PackageVersion {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for PackageVersion {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for PackageVersion {}

impl Display for PackageVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.raw)
	}
}
