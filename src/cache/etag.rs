//! Entity-tag generation and comparison.
//!
//! Tags are derived from the exact serialized bytes of a representation,
//! so the same payload always yields the same tag regardless of whether
//! it came from the cache or from upstream.

use xxhash_rust::xxh3::xxh3_128;

const WEAK_PREFIX: &str = "W/";

/// Strong entity tag (`"<32 hex digits>"`) for the given content.
pub fn make_etag(content: impl AsRef<[u8]>) -> String {
    format!("\"{:032x}\"", xxh3_128(content.as_ref()))
}

/// Weak entity tag (`W/"<32 hex digits>"`) for the given content.
pub fn make_weak_etag(content: impl AsRef<[u8]>) -> String {
    format!("{}{}", WEAK_PREFIX, make_etag(content))
}

/// Return the first syntactically valid tag of an `If-None-Match` /
/// `If-Match` header value.
pub fn extract_etag(header: Option<&str>) -> Option<String> {
    header?
        .split(',')
        .map(str::trim)
        .find(|candidate| is_valid_etag(candidate))
        .map(str::to_string)
}

fn is_valid_etag(candidate: &str) -> bool {
    let opaque = candidate.strip_prefix(WEAK_PREFIX).unwrap_or(candidate);
    opaque.len() >= 2
        && opaque.starts_with('"')
        && opaque.ends_with('"')
        && !opaque[1..opaque.len() - 1].contains('"')
}

/// Weak comparison: `W/"x"` matches `"x"`.
pub fn etag_matches(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn normalize(tag: &str) -> &str {
    let tag = tag.trim();
    let tag = tag.strip_prefix(WEAK_PREFIX).unwrap_or(tag);
    tag.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag)
}
