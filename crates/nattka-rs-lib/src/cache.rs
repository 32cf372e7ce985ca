//! Results of previous sanity checks, kept between runs.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::package_list::PackageListFingerprint;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

mod timestamp {
	use super::*;
	use serde::{Deserializer, Serializer};

	pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&t.format(TIMESTAMP_FORMAT).to_string())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
		let s = String::deserialize(d)?;
		NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
			.map(|t| t.and_utc())
			.map_err(serde::de::Error::custom)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheEntry {
	#[serde(with = "timestamp")]
	pub last_check: DateTime<Utc>,
	pub package_list: PackageListFingerprint,
	/// Outcome of the check, `None` when it could not be done.
	pub check_res: Option<bool>,
	/// Whether the bug was updated to match `check_res`.
	#[serde(default)]
	pub updated: bool,
}

impl CacheEntry {
	pub fn new(package_list: PackageListFingerprint, check_res: Option<bool>, now: DateTime<Utc>) -> Self {
		Self { last_check: now, package_list, check_res, updated: false }
	}

	/// Why the entry can not stand in for a new check, or `None` if it can.
	pub fn recheck_reason(&self, package_list: &PackageListFingerprint, sanity_check: Option<bool>, now: DateTime<Utc>, max_age: Duration, update_mode: bool) -> Option<&'static str> {
		let age = now.signed_duration_since(self.last_check).to_std().unwrap_or_default();
		if self.package_list != *package_list {
			Some("Package list changed, will recheck.")
		} else if self.check_res != sanity_check {
			Some("Sanity-check flag changed, will recheck.")
		} else if age > max_age {
			Some("Cache entry is old, will recheck.")
		} else if update_mode && !self.updated {
			Some("Cache entry from no-update mode, will recheck.")
		} else {
			None
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cache {
	#[serde(default)]
	bugs: BTreeMap<String, CacheEntry>,
}

impl Cache {
	/// Reads the cache, a missing file gives an empty one.
	pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
		let path = path.as_ref();
		match std::fs::read_to_string(path) {
			Ok(s) => Ok(serde_json::from_str(&s)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				log::debug!("No cache at {}", path.display());
				Ok(Self::default())
			},
			Err(e) => Err(e.into()),
		}
	}

	/// Atomically replaces the file at `path`.
	pub fn save(&self, path: impl AsRef<Path>) -> crate::Result<()> {
		let path = path.as_ref();
		let dir = match path.parent() {
			Some(p) if !p.as_os_str().is_empty() => p,
			_ => Path::new("."),
		};
		std::fs::create_dir_all(dir)?;
		let mut f = tempfile::NamedTempFile::new_in(dir)?;
		serde_json::to_writer_pretty(&mut f, self)?;
		f.write_all(b"\n")?;
		f.persist(path).map_err(|e| e.error)?;
		Ok(())
	}

	pub fn get(&self, id: u64) -> Option<&CacheEntry> {
		self.bugs.get(&id.to_string())
	}

	pub fn get_mut(&mut self, id: u64) -> Option<&mut CacheEntry> {
		self.bugs.get_mut(&id.to_string())
	}

	pub fn insert(&mut self, id: u64, entry: CacheEntry) {
		self.bugs.insert(id.to_string(), entry);
	}

	pub fn len(&self) -> usize {
		self.bugs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bugs.is_empty()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use chrono::TimeZone;

	fn fingerprint(pairs: &[(&str, &[&str])]) -> PackageListFingerprint {
		pairs.iter().map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect())).collect()
	}

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap()
	}

	const HOUR: Duration = Duration::from_secs(3600);

	#[test]
	fn json_layout() {
		let mut cache = Cache::default();
		cache.insert(560322, CacheEntry::new(fingerprint(&[("test/foo-1", &["amd64"])]), Some(true), now()));
		let v = serde_json::to_value(&cache).unwrap();
		assert_eq!(v, serde_json::json!({
			"bugs": {"560322": {
				"last-check": "2020-05-01T12:00:00",
				"package-list": {"test/foo-1": ["amd64"]},
				"check-res": true,
				"updated": false,
			}}
		}));
	}

	#[test]
	fn reads_old_entries() {
		let cache: Cache = serde_json::from_str(r#"{"bugs": {"1": {"last-check": "2020-05-01T12:00:00", "package-list": {}, "check-res": null}}}"#).unwrap();
		let e = cache.get(1).unwrap();
		assert_eq!(e.last_check, now());
		assert!(!e.updated && e.check_res.is_none());
	}

	#[test]
	fn up_to_date() {
		let fp = fingerprint(&[("test/foo-1", &["amd64"])]);
		let mut e = CacheEntry::new(fp.clone(), Some(true), now());
		e.updated = true;
		assert_eq!(e.recheck_reason(&fp, Some(true), now() + chrono::Duration::minutes(5), HOUR, true), None);
	}

	#[test]
	fn recheck_reasons() {
		let fp = fingerprint(&[("test/foo-1", &["amd64"])]);
		let e = CacheEntry::new(fp.clone(), Some(true), now());
		assert_eq!(e.recheck_reason(&fingerprint(&[]), Some(true), now(), HOUR, false), Some("Package list changed, will recheck."));
		assert_eq!(e.recheck_reason(&fp, None, now(), HOUR, false), Some("Sanity-check flag changed, will recheck."));
		assert_eq!(e.recheck_reason(&fp, Some(true), now() + chrono::Duration::hours(2), HOUR, false), Some("Cache entry is old, will recheck."));
		assert_eq!(e.recheck_reason(&fp, Some(true), now(), HOUR, true), Some("Cache entry from no-update mode, will recheck."));
		assert_eq!(e.recheck_reason(&fp, Some(true), now(), HOUR, false), None);
	}

	#[test]
	fn load_missing() {
		let dir = tempfile::tempdir().unwrap();
		assert!(Cache::load(dir.path().join("cache.json")).unwrap().is_empty());
	}

	#[test]
	fn save_and_load() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("sub").join("cache.json");
		let mut cache = Cache::default();
		cache.insert(7, CacheEntry::new(fingerprint(&[]), None, now()));
		cache.save(&path).unwrap();
		assert_eq!(Cache::load(&path).unwrap(), cache);
	}
}
