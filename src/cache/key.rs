//! Deterministic cache key construction.
//!
//! # Key Layout
//! ```text
//! {build_id}:{namespace}:{route}:{stable_hash(params)}
//! ```
//!
//! # Design Decisions
//! - Every segment is lowercased, trimmed and has `:` escaped, so the
//!   separator stays unambiguous
//! - The build id scopes every key to one deployment; a new build starts
//!   with a cold cache instead of reading stale shapes
//! - Parameter hashing ignores key order, array order, case and
//!   surrounding whitespace

use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

/// Escape sequence substituted for `:` inside a key segment.
const COLON_ESCAPE: &str = "%3a";

/// Normalize a single key segment.
fn normalize_part(part: &str) -> String {
    part.trim().to_lowercase().replace(':', COLON_ESCAPE)
}

/// Builds reproducible cache keys for one deployment.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    build_id: String,
    namespace: String,
}

impl KeyBuilder {
    pub fn new(build_id: impl AsRef<str>, namespace: impl AsRef<str>) -> Self {
        Self {
            build_id: normalize_part(build_id.as_ref()),
            namespace: normalize_part(namespace.as_ref()),
        }
    }

    /// Join normalized parts under the build id: `{build_id}:{p1}:{p2}...`.
    pub fn ckey<S: AsRef<str>>(&self, parts: &[S]) -> String {
        let mut key = self.build_id.clone();
        for part in parts {
            key.push(':');
            key.push_str(&normalize_part(part.as_ref()));
        }
        key
    }

    /// Key for a cacheable read of `route` with the given parameters.
    pub fn request_key(&self, route: &str, params: &Value) -> String {
        let hash = stable_hash(params);
        self.ckey(&[self.namespace.as_str(), route, hash.as_str()])
    }

    /// Key of the set holding every cache key attached to `tag`.
    pub fn tag_key(&self, tag: &str) -> String {
        self.ckey(&["tag", tag])
    }

    /// Prefix `pattern` with the build id unless it already carries it.
    pub fn scoped_pattern(&self, pattern: &str) -> String {
        let pattern = pattern.trim().to_lowercase();
        let prefix = format!("{}:", self.build_id);
        if pattern.starts_with(&prefix) {
            pattern
        } else {
            format!("{prefix}{pattern}")
        }
    }
}

/// Order- and case-insensitive hash of a structured value.
///
/// Primitives are stringified, strings lowercased and trimmed, array
/// elements hashed then sorted, object entries sorted by normalized key.
pub fn stable_hash(value: &Value) -> String {
    format!("{:016x}", xxh3_64(canonical(value).as_bytes()))
}

fn canonical(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_lowercase(),
        Value::Array(items) => {
            let mut hashes: Vec<String> = items.iter().map(stable_hash).collect();
            hashes.sort_unstable();
            format!("[{}]", hashes.join(","))
        }
        Value::Object(map) => {
            let mut entries: Vec<(String, String)> = map
                .iter()
                .map(|(k, v)| (k.trim().to_lowercase(), stable_hash(v)))
                .collect();
            entries.sort();
            let joined: Vec<String> = entries
                .into_iter()
                .map(|(k, h)| format!("{}={}", k, h))
                .collect();
            format!("{{{}}}", joined.join("&"))
        }
    }
}
