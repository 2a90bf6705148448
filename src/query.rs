//! Translate a free-text query into an Elasticsearch search request.
//!
//! The query text is handed to Elasticsearch as a `query_string` query and is
//! otherwise passed through untouched. The request always sorts ascending by
//! the timestamp field, then by a tiebreaker field, so that `search_after`
//! pagination resumes at a stable position.
//!
//! # Request shape
//!
//! ```json
//! {
//!   "size": 50,
//!   "track_total_hits": true,
//!   "query": { "bool": {
//!     "must":   [ { "query_string": { "query": "level:error" } } ],
//!     "filter": [ { "range": { "@timestamp": { "gte": "2024-01-01T00:00:00.000Z" } } } ]
//!   } },
//!   "sort": [ { "@timestamp": { "order": "asc", "numeric_type": "date" } },
//!             { "_id": { "order": "asc" } } ],
//!   "search_after": [1704067200000, "abc"]
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::error::{TailError, TailResult};
use crate::models::ContinuationToken;

/// A backend search request for one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub query: String,
    pub timestamp_field: String,
    pub tiebreaker: String,
    /// Inclusive lower bound on `timestamp_field`.
    pub lower_bound: Option<DateTime<Utc>>,
    pub size: usize,
}

/// Inputs the scheduler hands the builder at the start of each cycle.
#[derive(Debug, Clone, Copy)]
pub struct QuerySpec<'a> {
    pub index: &'a str,
    pub query: &'a str,
    pub timestamp_field: &'a str,
    pub tiebreaker: &'a str,
    pub page_size: usize,
}

/// Build the request for a cycle whose cursor sits at `lower_bound`.
pub fn build_request(
    spec: QuerySpec<'_>,
    lower_bound: Option<DateTime<Utc>>,
) -> TailResult<SearchRequest> {
    validate_query(spec.query)?;
    Ok(SearchRequest {
        index: spec.index.to_string(),
        query: spec.query.trim().to_string(),
        timestamp_field: spec.timestamp_field.to_string(),
        tiebreaker: spec.tiebreaker.to_string(),
        lower_bound,
        size: spec.page_size,
    })
}

impl SearchRequest {
    /// Render the Elasticsearch `_search` body, resuming after `token` if given.
    pub fn to_body(&self, token: Option<&ContinuationToken>) -> Value {
        let must = if self.query.is_empty() {
            json!([{ "match_all": {} }])
        } else {
            json!([{ "query_string": { "query": self.query } }])
        };

        let filter = match self.lower_bound {
            Some(ts) => json!([{
                "range": {
                    self.timestamp_field.as_str(): {
                        "gte": ts.to_rfc3339_opts(SecondsFormat::Millis, true),
                        "format": "strict_date_optional_time"
                    }
                }
            }]),
            None => json!([]),
        };

        let mut body = json!({
            "size": self.size,
            "track_total_hits": true,
            "query": { "bool": { "must": must, "filter": filter } },
            "sort": [
                { self.timestamp_field.as_str(): { "order": "asc", "numeric_type": "date" } },
                { self.tiebreaker.as_str(): { "order": "asc" } }
            ]
        });

        if let Some(token) = token {
            body["search_after"] = token.as_value().clone();
        }
        body
    }
}

/// Reject query text that Elasticsearch would fail to parse.
///
/// Checks balanced double quotes, balanced parentheses outside quotes, and a
/// dangling boolean operator at the end of the query.
pub fn validate_query(query: &str) -> TailResult<()> {
    let mut depth: i64 = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for c in query.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth -= 1;
                if depth < 0 {
                    return Err(TailError::InvalidQuery(format!(
                        "unexpected ')' in query: {}",
                        query
                    )));
                }
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err(TailError::InvalidQuery(format!(
            "unterminated quote in query: {}",
            query
        )));
    }
    if depth != 0 {
        return Err(TailError::InvalidQuery(format!(
            "unbalanced parentheses in query: {}",
            query
        )));
    }
    if let Some(last) = query.split_whitespace().last() {
        if matches!(last, "AND" | "OR" | "NOT" | "&&" | "||") {
            return Err(TailError::InvalidQuery(format!(
                "query ends with operator '{}': {}",
                last, query
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec(query: &str) -> QuerySpec<'_> {
        QuerySpec {
            index: "logstash-*",
            query,
            timestamp_field: "@timestamp",
            tiebreaker: "_id",
            page_size: 50,
        }
    }

    #[test]
    fn empty_query_matches_all() {
        let req = build_request(spec("  "), None).unwrap();
        let body = req.to_body(None);
        assert_eq!(body["query"]["bool"]["must"][0], json!({ "match_all": {} }));
        assert_eq!(body["query"]["bool"]["filter"], json!([]));
        assert_eq!(body["size"], 50);
        assert!(body.get("search_after").is_none());
    }

    #[test]
    fn query_string_and_inclusive_range() {
        let ts = Utc.timestamp_millis_opt(1_704_067_200_123).unwrap();
        let req = build_request(spec("level:error AND app:api"), Some(ts)).unwrap();
        let body = req.to_body(None);

        assert_eq!(
            body["query"]["bool"]["must"][0]["query_string"]["query"],
            "level:error AND app:api"
        );
        let range = &body["query"]["bool"]["filter"][0]["range"]["@timestamp"];
        assert_eq!(range["gte"], "2024-01-01T00:00:00.123Z");
        assert!(range.get("gt").is_none());
    }

    #[test]
    fn sort_is_timestamp_then_tiebreaker() {
        let req = build_request(spec(""), None).unwrap();
        let body = req.to_body(None);
        assert_eq!(body["sort"][0]["@timestamp"]["order"], "asc");
        assert_eq!(body["sort"][1]["_id"]["order"], "asc");
    }

    #[test]
    fn continuation_token_becomes_search_after() {
        let req = build_request(spec(""), None).unwrap();
        let token = ContinuationToken::new(json!([1_000, "doc-9"]));
        let body = req.to_body(Some(&token));
        assert_eq!(body["search_after"], json!([1_000, "doc-9"]));
    }

    #[test]
    fn request_is_deterministic() {
        let req = build_request(spec("a OR b"), None).unwrap();
        assert_eq!(req.to_body(None), req.to_body(None));
    }

    #[test]
    fn rejects_untranslatable_queries() {
        for bad in [
            "message:\"unterminated",
            "(a OR b",
            "a OR b)",
            "level:error AND",
        ] {
            let err = build_request(spec(bad), None).unwrap_err();
            assert!(matches!(err, TailError::InvalidQuery(_)), "{}", bad);
        }
    }

    #[test]
    fn accepts_escaped_and_quoted_punctuation() {
        assert!(validate_query(r#"message:"a (b" AND path:\(x"#).is_ok());
        assert!(validate_query(r#"msg:"say \"hi\"""#).is_ok());
    }
}
