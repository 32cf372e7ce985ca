//! Package dependency atoms, e.g. `>=dev-libs/foo-1.2:0/1.2=[bar]`.

use std::fmt::Display;

use regex::Regex;

use super::version::{PackageVersion, VERSION_PATTERN};
use super::PackageCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocker {
	/// `!`
	Weak,
	/// `!!`
	Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomOperator {
	Less,
	LessOrEqual,
	Equal,
	/// `~`, any revision of the version.
	Approximate,
	GreaterOrEqual,
	Greater,
}

impl AtomOperator {
	fn as_str(&self) -> &'static str {
		match self {
			Self::Less => "<",
			Self::LessOrEqual => "<=",
			Self::Equal => "=",
			Self::Approximate => "~",
			Self::GreaterOrEqual => ">=",
			Self::Greater => ">",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOperator {
	/// `:*`
	Any,
	/// `:=`
	Rebuild,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
	pub blocker: Option<Blocker>,
	pub operator: Option<AtomOperator>,
	pub category: String,
	pub package: String,
	pub version: Option<PackageVersion>,
	/// `=cat/pkg-1*` style prefix match.
	pub glob: bool,
	pub slot: Option<String>,
	pub subslot: Option<String>,
	pub slot_operator: Option<SlotOperator>,
	pub use_deps: Vec<String>,
}

fn name_regexes() -> (Regex, Regex, Regex) {
	let category = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9+_.-]*$").expect("static regex");
	let package = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9+_-]*$").expect("static regex");
	let versioned = Regex::new(&format!(r"^([A-Za-z0-9_][A-Za-z0-9+_-]*?)-({})(\*?)$", VERSION_PATTERN)).expect("static regex");
	(category, package, versioned)
}

impl Atom {
	/// Parses a single atom.
	/// 
	/// Repository qualifiers (`::repo`) are rejected.
	pub fn parse(s: &str) -> crate::Result<Self> {
		let invalid = |why: &str| crate::Error::Parse(format!("invalid atom {}: {}", s, why));
		let (category_re, package_re, versioned_re) = name_regexes();

		let mut rest = s;
		let blocker = if let Some(r) = rest.strip_prefix("!!") {
			rest = r;
			Some(Blocker::Strong)
		} else if let Some(r) = rest.strip_prefix('!') {
			rest = r;
			Some(Blocker::Weak)
		} else {
			None
		};

		let mut operator = None;
		for (p, op) in [
			("<=", AtomOperator::LessOrEqual),
			(">=", AtomOperator::GreaterOrEqual),
			("<", AtomOperator::Less),
			(">", AtomOperator::Greater),
			("=", AtomOperator::Equal),
			("~", AtomOperator::Approximate),
		] {
			if let Some(r) = rest.strip_prefix(p) {
				rest = r;
				operator = Some(op);
				break;
			}
		}

		let mut use_deps = Vec::new();
		if let Some(r) = rest.strip_suffix(']') {
			let (head, uses) = r.split_once('[').ok_or_else(|| invalid("unbalanced USE dependency"))?;
			if uses.is_empty() || uses.contains(['[', ']']) {
				return Err(invalid("malformed USE dependency"));
			}
			use_deps = uses.split(',').map(|u| u.to_string()).collect();
			rest = head;
		}
		if rest.contains("::") {
			return Err(invalid("repository dependencies are not allowed"));
		}

		let (mut slot, mut subslot, mut slot_operator) = (None, None, None);
		if let Some((head, slot_str)) = rest.split_once(':') {
			rest = head;
			let mut slot_str = slot_str;
			if slot_str == "*" {
				slot_operator = Some(SlotOperator::Any);
				slot_str = "";
			} else if let Some(s) = slot_str.strip_suffix('=') {
				slot_operator = Some(SlotOperator::Rebuild);
				slot_str = s;
			}
			if !slot_str.is_empty() {
				let (s, sub) = match slot_str.split_once('/') {
					Some((s, sub)) => (s, Some(sub)),
					None => (slot_str, None),
				};
				if !package_re.is_match(s) || sub.map_or(false, |x| !package_re.is_match(x)) {
					return Err(invalid("malformed slot"));
				}
				slot = Some(s.to_string());
				subslot = sub.map(|x| x.to_string());
			} else if slot_operator.is_none() {
				return Err(invalid("empty slot"));
			}
		}

		let (category, pv) = rest.split_once('/').ok_or_else(|| invalid("missing category"))?;
		if !category_re.is_match(category) {
			return Err(invalid("malformed category"));
		}

		let (package, version, glob) = match operator {
			Some(op) => {
				let c = versioned_re.captures(pv).ok_or_else(|| invalid("operator without a valid version"))?;
				let glob = !c[3].is_empty();
				if glob && op != AtomOperator::Equal {
					return Err(invalid("* is only valid with ="));
				}
				(c[1].to_string(), Some(PackageVersion::new(&c[2])?), glob)
			},
			None => {
				if !package_re.is_match(pv) {
					return Err(invalid("malformed package name"));
				}
				if versioned_re.is_match(pv) {
					return Err(invalid("version without an operator"));
				}
				(pv.to_string(), None, false)
			},
		};

		Ok(Self { blocker, operator, category: category.to_string(), package, version, glob, slot, subslot, slot_operator, use_deps })
	}

	/// `category/package`
	pub fn key(&self) -> String {
		format!("{}/{}", self.category, self.package)
	}

	/// Whether `pkg` falls within this atom.
	/// 
	/// Blockers and USE dependencies are not taken into account.
	pub fn matches(&self, pkg: &PackageCandidate) -> bool {
		if self.category != pkg.category || self.package != pkg.package {
			return false;
		}
		if let Some(slot) = &self.slot {
			if *slot != pkg.slot {
				return false;
			}
			if self.subslot.is_some() && self.subslot.as_deref() != Some(pkg.subslot()) {
				return false;
			}
		}
		let (Some(op), Some(ver)) = (self.operator, &self.version) else {
			return true;
		};
		let pv = &pkg.version;
		match op {
			AtomOperator::Equal if self.glob => pv.as_str().starts_with(ver.as_str()),
			AtomOperator::Equal => pv == ver,
			AtomOperator::Approximate => pv.cmp_without_revision(ver).is_eq(),
			AtomOperator::Less => pv < ver,
			AtomOperator::LessOrEqual => pv <= ver,
			AtomOperator::Greater => pv > ver,
			AtomOperator::GreaterOrEqual => pv >= ver,
		}
	}
}

impl std::str::FromStr for Atom {
	type Err = crate::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl Display for Atom {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.blocker {
			Some(Blocker::Strong) => write!(f, "!!")?,
			Some(Blocker::Weak) => write!(f, "!")?,
			None => {},
		}
		if let Some(op) = self.operator {
			write!(f, "{}", op.as_str())?;
		}
		write!(f, "{}/{}", self.category, self.package)?;
		if let Some(v) = &self.version {
			write!(f, "-{}", v)?;
		}
		if self.glob {
			write!(f, "*")?;
		}
		if self.slot.is_some() || self.slot_operator.is_some() {
			write!(f, ":")?;
			if let Some(s) = &self.slot {
				write!(f, "{}", s)?;
			}
			if let Some(s) = &self.subslot {
				write!(f, "/{}", s)?;
			}
			match self.slot_operator {
				Some(SlotOperator::Any) => write!(f, "*")?,
				Some(SlotOperator::Rebuild) => write!(f, "=")?,
				None => {},
			}
		}
		if !self.use_deps.is_empty() {
			write!(f, "[{}]", self.use_deps.join(","))?;
		}
		Ok(())
	}
}
