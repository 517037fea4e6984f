//! Typed upstream requests.
//!
//! Each variant knows its upstream path, its cache route and tags, the
//! parameters that identify it, and the empty payload served when the
//! upstream is unavailable.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::schema::{CachePolicies, EndpointPolicy};
use crate::upstream::UpstreamError;

/// Sections accepted by the Top Stories API.
pub const TOP_STORIES_SECTIONS: &[&str] = &[
    "arts", "automobiles", "books", "business", "fashion", "food", "health", "home", "insider",
    "magazine", "movies", "nyregion", "obituaries", "opinion", "politics", "realestate",
    "science", "sports", "sundayreview", "technology", "theater", "t-magazine", "travel",
    "upshot", "us", "world",
];

/// Sort orders accepted by Article Search.
pub const SEARCH_SORTS: &[&str] = &["newest", "oldest", "relevance"];

/// Most Popular variants.
pub const POPULAR_KINDS: &[&str] = &["viewed", "shared", "emailed"];

/// Most Popular periods in days.
pub const POPULAR_PERIODS: &[u8] = &[1, 7, 30];

/// First year covered by the Archive API.
pub const ARCHIVE_FIRST_YEAR: u16 = 1851;

/// Highest page Article Search serves.
pub const SEARCH_MAX_PAGE: u32 = 100;

/// Query string of `GET /api/articles/search`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub fq: Option<String>,
    pub page: Option<u32>,
    pub sort: Option<String>,
    pub begin_date: Option<String>,
    pub end_date: Option<String>,
}

/// One validated call to the NYT API.
#[derive(Debug, Clone, PartialEq)]
pub enum NytRequest {
    ArticleSearch(SearchParams),
    TopStories { section: String },
    Archive { year: u16, month: u8 },
    Books { list: String },
    MostPopular { kind: String, period: u8 },
}

impl NytRequest {
    pub fn article_search(params: SearchParams) -> Result<Self, UpstreamError> {
        if let Some(page) = params.page {
            if page > SEARCH_MAX_PAGE {
                return Err(UpstreamError::InvalidParams(format!(
                    "page must be between 0 and {SEARCH_MAX_PAGE}"
                )));
            }
        }
        if let Some(sort) = &params.sort {
            if !SEARCH_SORTS.contains(&sort.trim().to_lowercase().as_str()) {
                return Err(UpstreamError::InvalidParams(format!(
                    "sort must be one of {}",
                    SEARCH_SORTS.join(", ")
                )));
            }
        }
        for (name, date) in [("begin_date", &params.begin_date), ("end_date", &params.end_date)] {
            if let Some(date) = date {
                if !is_compact_date(date) {
                    return Err(UpstreamError::InvalidParams(format!("{name} must be YYYYMMDD")));
                }
            }
        }
        Ok(NytRequest::ArticleSearch(params))
    }

    pub fn top_stories(section: &str) -> Result<Self, UpstreamError> {
        let section = section.trim().to_lowercase();
        if !TOP_STORIES_SECTIONS.contains(&section.as_str()) {
            return Err(UpstreamError::InvalidParams(format!("unknown section '{section}'")));
        }
        Ok(NytRequest::TopStories { section })
    }

    pub fn archive(year: u16, month: u8, current_year: u16) -> Result<Self, UpstreamError> {
        if !(ARCHIVE_FIRST_YEAR..=current_year).contains(&year) {
            return Err(UpstreamError::InvalidParams(format!(
                "year must be between {ARCHIVE_FIRST_YEAR} and {current_year}"
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(UpstreamError::InvalidParams("month must be between 1 and 12".into()));
        }
        Ok(NytRequest::Archive { year, month })
    }

    pub fn books(list: &str) -> Result<Self, UpstreamError> {
        let list = list.trim().to_lowercase();
        let valid = !list.is_empty()
            && list.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(UpstreamError::InvalidParams(format!("invalid list name '{list}'")));
        }
        Ok(NytRequest::Books { list })
    }

    pub fn most_popular(kind: &str, period: u8) -> Result<Self, UpstreamError> {
        let kind = kind.trim().to_lowercase();
        if !POPULAR_KINDS.contains(&kind.as_str()) {
            return Err(UpstreamError::InvalidParams(format!(
                "kind must be one of {}",
                POPULAR_KINDS.join(", ")
            )));
        }
        if !POPULAR_PERIODS.contains(&period) {
            return Err(UpstreamError::InvalidParams("period must be 1, 7 or 30".into()));
        }
        Ok(NytRequest::MostPopular { kind, period })
    }

    /// Route segment of the cache key; also the resource-type tag.
    pub fn route(&self) -> &'static str {
        match self {
            NytRequest::ArticleSearch(_) => "articles",
            NytRequest::TopStories { .. } => "top-stories",
            NytRequest::Archive { .. } => "archive",
            NytRequest::Books { .. } => "books",
            NytRequest::MostPopular { .. } => "most-popular",
        }
    }

    /// Tags attached to the cached entry: resource type, then sub-resource.
    pub fn tags(&self) -> Vec<String> {
        let route = self.route();
        let sub = match self {
            NytRequest::ArticleSearch(_) => None,
            NytRequest::TopStories { section } => Some(section.clone()),
            NytRequest::Archive { year, month } => Some(format!("{year}-{month:02}")),
            NytRequest::Books { list } => Some(list.clone()),
            NytRequest::MostPopular { kind, period } => Some(format!("{kind}-{period}")),
        };
        let mut tags = vec![route.to_string()];
        if let Some(sub) = sub {
            tags.push(format!("{route}:{sub}"));
        }
        tags
    }

    /// Identifying parameters, hashed into the cache key.
    pub fn params(&self) -> Value {
        match self {
            NytRequest::ArticleSearch(p) => json!({
                "q": p.q,
                "fq": p.fq,
                "page": p.page.unwrap_or(0),
                "sort": p.sort,
                "begin_date": p.begin_date,
                "end_date": p.end_date,
            }),
            NytRequest::TopStories { section } => json!({ "section": section }),
            NytRequest::Archive { year, month } => json!({ "year": year, "month": month }),
            NytRequest::Books { list } => json!({ "list": list }),
            NytRequest::MostPopular { kind, period } => json!({ "kind": kind, "period": period }),
        }
    }

    /// Path below the upstream base URL.
    pub fn path(&self) -> String {
        match self {
            NytRequest::ArticleSearch(_) => "/search/v2/articlesearch.json".to_string(),
            NytRequest::TopStories { section } => format!("/topstories/v2/{section}.json"),
            NytRequest::Archive { year, month } => format!("/archive/v1/{year}/{month}.json"),
            NytRequest::Books { list } => format!("/books/v3/lists/current/{list}.json"),
            NytRequest::MostPopular { kind, period } => format!("/mostpopular/v2/{kind}/{period}.json"),
        }
    }

    /// Query parameters forwarded upstream (the API key is added by the client).
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let NytRequest::ArticleSearch(p) = self else {
            return Vec::new();
        };
        let mut query = Vec::new();
        if let Some(q) = &p.q {
            query.push(("q", q.clone()));
        }
        if let Some(fq) = &p.fq {
            query.push(("fq", fq.clone()));
        }
        if let Some(page) = p.page {
            query.push(("page", page.to_string()));
        }
        if let Some(sort) = &p.sort {
            query.push(("sort", sort.trim().to_lowercase()));
        }
        if let Some(d) = &p.begin_date {
            query.push(("begin_date", d.clone()));
        }
        if let Some(d) = &p.end_date {
            query.push(("end_date", d.clone()));
        }
        query
    }

    pub fn policy<'a>(&self, policies: &'a CachePolicies) -> &'a EndpointPolicy {
        match self {
            NytRequest::ArticleSearch(_) => &policies.article_search,
            NytRequest::TopStories { .. } => &policies.top_stories,
            NytRequest::Archive { .. } => &policies.archive,
            NytRequest::Books { .. } => &policies.books,
            NytRequest::MostPopular { .. } => &policies.most_popular,
        }
    }

    /// Empty, well-formed payload marked as degraded.
    pub fn degraded_payload(&self) -> Value {
        let body = match self {
            NytRequest::ArticleSearch(_) => json!({
                "response": { "docs": [], "meta": { "hits": 0, "offset": 0, "time": 0 } }
            }),
            NytRequest::TopStories { section } => json!({
                "section": section, "num_results": 0, "results": []
            }),
            NytRequest::Archive { .. } => json!({
                "response": { "docs": [], "meta": { "hits": 0 } }
            }),
            NytRequest::Books { list } => json!({
                "num_results": 0, "results": { "list_name_encoded": list, "books": [] }
            }),
            NytRequest::MostPopular { .. } => json!({ "num_results": 0, "results": [] }),
        };
        let mut body = body;
        if let Value::Object(map) = &mut body {
            map.insert("status".into(), json!("DEGRADED"));
            map.insert("degraded".into(), json!(true));
        }
        body
    }
}

/// Current UTC calendar year (upper bound for archive requests).
pub fn current_year() -> u16 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    year_from_days((secs / 86_400) as i64)
}

/// Civil year of a day count since 1970-01-01 (proleptic Gregorian).
fn year_from_days(days: i64) -> u16 {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    year as u16
}

fn is_compact_date(s: &str) -> bool {
    if s.len() != 8 || !s.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let month: u8 = s[4..6].parse().unwrap_or(0);
    let day: u8 = s[6..8].parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_from_days() {
        assert_eq!(year_from_days(0), 1970);
        assert_eq!(year_from_days(364), 1970);
        assert_eq!(year_from_days(365), 1971);
        // 2024-12-31 and 2025-01-01
        assert_eq!(year_from_days(20_088), 2024);
        assert_eq!(year_from_days(20_089), 2025);
        assert!(current_year() >= 2024);
    }

    #[test]
    fn test_search_validation() {
        let ok = SearchParams {
            q: Some("mars".into()),
            sort: Some("Newest".into()),
            begin_date: Some("20240101".into()),
            ..SearchParams::default()
        };
        assert!(NytRequest::article_search(ok).is_ok());

        let bad_page = SearchParams { page: Some(101), ..SearchParams::default() };
        assert!(NytRequest::article_search(bad_page).is_err());

        let bad_sort = SearchParams { sort: Some("random".into()), ..SearchParams::default() };
        assert!(NytRequest::article_search(bad_sort).is_err());

        let bad_date = SearchParams { end_date: Some("2024-01-01".into()), ..SearchParams::default() };
        assert!(NytRequest::article_search(bad_date).is_err());
    }

    #[test]
    fn test_top_stories_sections() {
        assert_eq!(
            NytRequest::top_stories(" Arts ").unwrap(),
            NytRequest::TopStories { section: "arts".into() }
        );
        assert!(NytRequest::top_stories("gossip").is_err());
    }

    #[test]
    fn test_archive_bounds() {
        assert!(NytRequest::archive(1851, 1, 2026).is_ok());
        assert!(NytRequest::archive(1850, 1, 2026).is_err());
        assert!(NytRequest::archive(2027, 1, 2026).is_err());
        assert!(NytRequest::archive(2020, 13, 2026).is_err());
        assert!(NytRequest::archive(2020, 0, 2026).is_err());
    }

    #[test]
    fn test_most_popular_validation() {
        assert!(NytRequest::most_popular("viewed", 7).is_ok());
        assert!(NytRequest::most_popular("viewed", 2).is_err());
        assert!(NytRequest::most_popular("liked", 1).is_err());
    }

    #[test]
    fn test_tags_and_paths() {
        let req = NytRequest::archive(2024, 3, 2026).unwrap();
        assert_eq!(req.tags(), vec!["archive".to_string(), "archive:2024-03".to_string()]);
        assert_eq!(req.path(), "/archive/v1/2024/3.json");

        let req = NytRequest::books("Hardcover-Fiction").unwrap();
        assert_eq!(req.path(), "/books/v3/lists/current/hardcover-fiction.json");
        assert!(NytRequest::books("../etc").is_err());
    }

    #[test]
    fn test_degraded_payload_is_marked() {
        let req = NytRequest::top_stories("world").unwrap();
        let payload = req.degraded_payload();
        assert_eq!(payload["degraded"], true);
        assert_eq!(payload["results"], json!([]));
        assert_eq!(payload["section"], "world");
    }

    #[test]
    fn test_search_params_default_page_in_key() {
        let a = NytRequest::article_search(SearchParams { q: Some("x".into()), ..Default::default() }).unwrap();
        let b = NytRequest::article_search(SearchParams { q: Some("x".into()), page: Some(0), ..Default::default() }).unwrap();
        assert_eq!(a.params(), b.params());
    }
}
