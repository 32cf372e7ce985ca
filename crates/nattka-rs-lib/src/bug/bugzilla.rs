//! [`BugTracker`] over the Bugzilla REST API.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::*;

const INCLUDE_FIELDS: &str = "id,product,component,cf_stabilisation_atoms,cc,depends_on,blocks,flags,keywords,assigned_to,resolution,last_change_time";
const SANITY_CHECK_FLAG: &str = "sanity-check";
const SECURITY_PRODUCT: &str = "Gentoo Security";

#[derive(Debug, Deserialize)]
struct RestFlag {
	name: String,
	status: String,
}

#[derive(Debug, Deserialize)]
struct RestBug {
	id: u64,
	#[serde(default)]
	product: String,
	#[serde(default)]
	component: String,
	#[serde(default)]
	cf_stabilisation_atoms: Option<String>,
	#[serde(default)]
	cc: Vec<String>,
	#[serde(default)]
	depends_on: Vec<u64>,
	#[serde(default)]
	blocks: Vec<u64>,
	#[serde(default)]
	flags: Vec<RestFlag>,
	#[serde(default)]
	keywords: Vec<String>,
	#[serde(default)]
	assigned_to: String,
	#[serde(default)]
	resolution: String,
	last_change_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RestBugs {
	bugs: Vec<RestBug>,
}

#[derive(Debug, Deserialize)]
struct RestComment {
	id: u64,
	#[serde(default)]
	creator: String,
	#[serde(default)]
	text: String,
	#[serde(default)]
	tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RestBugComments {
	comments: Vec<RestComment>,
}

#[derive(Debug, Deserialize)]
struct RestComments {
	bugs: BTreeMap<String, RestBugComments>,
}

#[derive(Debug, Deserialize)]
struct RestWhoami {
	name: String,
}

#[derive(Debug, Deserialize)]
struct RestError {
	#[serde(default)]
	error: bool,
	#[serde(default)]
	message: Option<String>,
}

impl From<RestBug> for BugRecord {
	fn from(b: RestBug) -> Self {
		/* Keywords only decide the category when the component does not */
		let category = BugCategory::from_component(&b.component).or_else(|| {
			if b.keywords.iter().any(|k| k == "STABLEREQ") {
				Some(BugCategory::StableReq)
			} else if b.keywords.iter().any(|k| k == "KEYWORDREQ") {
				Some(BugCategory::KeywordReq)
			} else {
				None
			}
		});
		let sanity_check = b.flags.iter()
			.find(|f| f.name == SANITY_CHECK_FLAG)
			.and_then(|f| match f.status.as_str() {
				"+" => Some(true),
				"-" => Some(false),
				_ => None,
			});
		let mut atoms = b.cf_stabilisation_atoms.unwrap_or_default();
		atoms.push_str("\r\n");

		BugRecord {
			id: b.id,
			category,
			atoms,
			cc: b.cc,
			depends: b.depends_on,
			blocks: b.blocks,
			sanity_check,
			security: b.product == SECURITY_PRODUCT,
			resolved: !b.resolution.is_empty(),
			keywords: b.keywords,
			assigned_to: b.assigned_to,
			last_change_time: b.last_change_time,
		}
	}
}

pub struct Bugzilla {
	endpoint: String,
	api_key: Option<String>,
	client: reqwest::blocking::Client,
	whoami: OnceCell<String>,
}

impl Bugzilla {
	/// # Arguments
	/// - `endpoint`: the `/rest` URL.
	/// - `api_key`: required for anything that modifies bugs.
	pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> crate::Result<Self> {
		let client = reqwest::blocking::Client::builder()
			.user_agent(concat!("nattka-rs/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self {
			endpoint: endpoint.into().trim_end_matches('/').to_string(),
			api_key,
			client,
			whoami: OnceCell::new(),
		})
	}

	fn request(&self, method: reqwest::Method, path: &str) -> reqwest::blocking::RequestBuilder {
		let mut req = self.client.request(method, format!("{}/{}", self.endpoint, path));
		if let Some(key) = &self.api_key {
			req = req.header("X-BUGZILLA-API-KEY", key);
		}
		req
	}

	fn send<T: serde::de::DeserializeOwned>(&self, req: reqwest::blocking::RequestBuilder) -> crate::Result<T> {
		let resp = req.send()?;
		let status = resp.status();
		let body = resp.text()?;
		if !status.is_success() {
			let message = serde_json::from_str::<RestError>(&body).ok()
				.filter(|e| e.error)
				.and_then(|e| e.message)
				.unwrap_or(body);
			return Err(crate::Error::Bugzilla(format!("{}: {}", status, message)));
		}
		Ok(serde_json::from_str(&body)?)
	}

	/// Login of the account behind the API key.
	pub fn whoami(&self) -> crate::Result<&str> {
		if self.whoami.get().is_none() {
			let r: RestWhoami = self.send(self.request(reqwest::Method::GET, "whoami"))?;
			let _ = self.whoami.set(r.name);
		}
		Ok(self.whoami.get().map(|s| s.as_str()).unwrap_or_default())
	}

	fn comments(&self, id: u64) -> crate::Result<Vec<RestComment>> {
		let mut r: RestComments = self.send(self.request(reqwest::Method::GET, &format!("bug/{}/comment", id)))?;
		Ok(r.bugs.remove(&id.to_string()).map(|c| c.comments).unwrap_or_default())
	}

	fn mark_own_comments_obsolete(&self, id: u64) -> crate::Result<()> {
		let me = self.whoami()?.to_string();
		/* the first comment is the bug description */
		for c in self.comments(id)?.into_iter().skip(1) {
			if c.creator == me && !c.tags.iter().any(|t| t == "obsolete") {
				log::debug!("Bug {}: marking comment {} obsolete", id, c.id);
				let _: serde_json::Value = self.send(
					self.request(reqwest::Method::PUT, &format!("bug/comment/{}/tags", c.id))
						.json(&json!({ "comment_id": c.id, "add": ["obsolete"] }))
				)?;
			}
		}
		Ok(())
	}

	fn query_params(query: &BugQuery) -> Vec<(String, String)> {
		let mut params = vec![("include_fields".to_string(), INCLUDE_FIELDS.to_string())];
		if !query.bugs.is_empty() {
			params.push(("id".into(), query.bugs.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(",")));
		}
		for c in &query.categories {
			params.push(("component".into(), c.component().into()));
		}
		if query.unresolved {
			params.push(("resolution".into(), "---".into()));
		}

		let mut field = 0;
		let mut advanced = |f: &str, o: &str, v: String| {
			field += 1;
			params.push((format!("f{}", field), f.into()));
			params.push((format!("o{}", field), o.into()));
			params.push((format!("v{}", field), v));
		};
		for cc in &query.cc {
			advanced("cc", "equals", cc.clone());
		}
		if !query.skip_tags.is_empty() {
			advanced("tag", "nowords", query.skip_tags.join(" "));
		}
		if !query.sanity_check.is_empty() {
			let states = query.sanity_check.iter()
				.map(|s| format!("{}{}", SANITY_CHECK_FLAG, if *s { "+" } else { "-" }))
				.collect::<Vec<_>>()
				.join(" ");
			advanced("flagtypes.name", "anywords", states);
		}
		params
	}
}

impl BugTracker for Bugzilla {
	fn find_bugs(&self, query: &BugQuery) -> crate::Result<BTreeMap<u64, BugRecord>> {
		let r: RestBugs = self.send(self.request(reqwest::Method::GET, "bug").query(&Self::query_params(query)))?;
		Ok(r.bugs.into_iter().map(|b| (b.id, BugRecord::from(b))).collect())
	}

	fn latest_own_comment(&self, id: u64) -> crate::Result<Option<String>> {
		let me = self.whoami()?.to_string();
		Ok(self.comments(id)?
			.into_iter()
			.skip(1)
			.filter(|c| c.creator == me)
			.last()
			.map(|c| c.text))
	}

	fn update_status(&self, id: u64, update: &BugUpdate) -> crate::Result<()> {
		let status = match update.sanity_check {
			Some(true) => "+",
			Some(false) => "-",
			None => "X",
		};
		let mut body = json!({
			"ids": [id],
			"flags": [{ "name": SANITY_CHECK_FLAG, "status": status }],
		});
		if let Some(comment) = &update.comment {
			self.mark_own_comments_obsolete(id)?;
			body["comment"] = json!({ "body": comment });
		}
		if !update.cc_add.is_empty() {
			body["cc"] = json!({ "add": update.cc_add });
		}
		if !update.keywords_add.is_empty() || !update.keywords_remove.is_empty() {
			body["keywords"] = json!({ "add": update.keywords_add, "remove": update.keywords_remove });
		}
		if let Some(list) = &update.new_package_list {
			body["cf_stabilisation_atoms"] = json!(list);
		}

		log::trace!("Bug {}: update {}", id, body);
		let _: serde_json::Value = self.send(self.request(reqwest::Method::PUT, &format!("bug/{}", id)).json(&body))?;
		Ok(())
	}

	fn resolve_bug(&self, id: u64, uncc: &[String], comment: &str, close: bool) -> crate::Result<()> {
		let mut body = json!({
			"ids": [id],
			"cc": { "remove": uncc },
			"comment": { "body": comment },
		});
		if close {
			body["status"] = json!("RESOLVED");
			body["resolution"] = json!("FIXED");
		}
		let _: serde_json::Value = self.send(self.request(reqwest::Method::PUT, &format!("bug/{}", id)).json(&body))?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn rest_bug(json: serde_json::Value) -> BugRecord {
		BugRecord::from(serde_json::from_value::<RestBug>(json).unwrap())
	}

	#[test]
	fn record_from_rest() {
		let b = rest_bug(json!({
			"id": 7,
			"product": "Gentoo Linux",
			"component": "Stabilization",
			"cf_stabilisation_atoms": "=test/foo-1 amd64",
			"cc": ["amd64@gentoo.org"],
			"depends_on": [3],
			"flags": [{ "name": "sanity-check", "status": "-" }],
			"keywords": ["CC-ARCHES"],
			"resolution": "",
			"last_change_time": "2020-04-01T12:00:00Z",
		}));
		assert_eq!(b.category, Some(BugCategory::StableReq));
		assert_eq!(b.atoms, "=test/foo-1 amd64\r\n");
		assert_eq!(b.sanity_check, Some(false));
		assert!(!b.security && !b.resolved);
	}
	#[test]
	fn security_product() {
		let b = rest_bug(json!({ "id": 1, "product": "Gentoo Security", "component": "Vulnerabilities", "resolution": "FIXED", "last_change_time": "2020-04-01T12:00:00Z" }));
		assert!(b.security && b.resolved);
		assert_eq!(b.category, None);
	}
	#[test]
	fn category_from_keyword() {
		let b = rest_bug(json!({ "id": 1, "component": "Current packages", "keywords": ["STABLEREQ"], "last_change_time": "2020-04-01T12:00:00Z" }));
		assert_eq!(b.category, Some(BugCategory::StableReq));
	}
	#[test]
	fn query_flags() {
		let q = BugQuery { sanity_check: vec![true, false], skip_tags: vec!["nattka:skip".into()], ..Default::default() };
		let p = Bugzilla::query_params(&q);
		assert!(p.contains(&("v1".to_string(), "nattka:skip".to_string())));
		assert!(p.contains(&("v2".to_string(), "sanity-check+ sanity-check-".to_string())));
	}
}
