//! Name search over the cache
//!
//! A pattern containing a glob metacharacter (`*`, `?`, `[`, `{`) is matched
//! as a case-insensitive glob against the whole node name. Anything else is a
//! case-insensitive substring match. Results come back in remote path order,
//! trashed entries included. The remote store is never consulted.

use globset::{GlobBuilder, GlobMatcher};
use std::sync::Arc;

use crate::cache::NodeCache;
use crate::error::DriveError;
use crate::types::CacheEntry;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Compiled search pattern
#[derive(Debug, Clone)]
pub enum NamePattern {
	Glob(GlobMatcher),
	/// Lowercased needle
	Substring(String),
}

impl NamePattern {
	pub fn parse(pattern: &str) -> Result<Self, DriveError> {
		let trimmed = pattern.trim();
		if trimmed.is_empty() {
			return Err(DriveError::InvalidPattern {
				pattern: pattern.to_string(),
				reason: "empty pattern".to_string(),
			});
		}

		if trimmed.contains(GLOB_META) {
			let glob = GlobBuilder::new(trimmed)
				.case_insensitive(true)
				.literal_separator(true)
				.build()
				.map_err(|e| DriveError::InvalidPattern {
					pattern: pattern.to_string(),
					reason: e.to_string(),
				})?;
			Ok(NamePattern::Glob(glob.compile_matcher()))
		} else {
			Ok(NamePattern::Substring(trimmed.to_lowercase()))
		}
	}

	pub fn matches(&self, name: &str) -> bool {
		match self {
			NamePattern::Glob(matcher) => matcher.is_match(name),
			NamePattern::Substring(needle) => name.to_lowercase().contains(needle.as_str()),
		}
	}
}

pub struct Searcher {
	cache: Arc<NodeCache>,
}

impl Searcher {
	pub fn new(cache: Arc<NodeCache>) -> Self {
		Searcher { cache }
	}

	/// Cached entries whose name matches `pattern`, in path order
	pub fn search(&self, pattern: &str) -> Result<Vec<CacheEntry>, DriveError> {
		let pattern = NamePattern::parse(pattern)?;
		Ok(self
			.cache
			.entries()?
			.into_iter()
			.filter(|e| !e.node.name.is_empty() && pattern.matches(&e.node.name))
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;
	use crate::types::Node;
	use chrono::Utc;
	use tempfile::TempDir;

	#[test]
	fn test_empty_pattern_rejected() {
		assert_eq!(NamePattern::parse("").unwrap_err().kind(), ErrorKind::InvalidPattern);
		assert_eq!(NamePattern::parse("   ").unwrap_err().kind(), ErrorKind::InvalidPattern);
	}

	#[test]
	fn test_glob_and_substring() {
		let glob = NamePattern::parse("*.TXT").unwrap();
		assert!(glob.matches("notes.txt"));
		assert!(!glob.matches("notes.txt.bak"));

		let substring = NamePattern::parse("Note").unwrap();
		assert!(substring.matches("my notes.txt"));
		assert!(!substring.matches("nothing"));

		assert!(NamePattern::parse("[").is_err());
	}

	#[test]
	fn test_search_path_order_with_duplicates() {
		let tmp = TempDir::new().unwrap();
		let cache = Arc::new(NodeCache::open(&tmp.path().join("cache.db")).unwrap());
		let now = Utc::now();
		cache.observe(&Node::folder("root", "", None, now), "/", "").unwrap();
		cache.observe(&Node::file("Z", "zeta.txt", Some("root"), now, 1), "/zeta.txt", "zeta.txt").unwrap();
		cache.observe(&Node::file("B", "dup.txt", Some("root"), now, 1), "/dup.txt", "dup.txt~B").unwrap();
		cache.observe(&Node::file("A", "dup.txt", Some("root"), now, 1), "/dup.txt", "dup.txt~A").unwrap();
		cache.mark_trashed("Z").unwrap();

		let searcher = Searcher::new(cache);
		let ids: Vec<String> =
			searcher.search("*.txt").unwrap().into_iter().map(|e| e.node.id).collect();
		assert_eq!(ids, vec!["A", "B", "Z"]);

		assert_eq!(searcher.search("*").unwrap().len(), 3);
		assert_eq!(searcher.search("DUP").unwrap().len(), 2);
	}
}

// vim: ts=4
