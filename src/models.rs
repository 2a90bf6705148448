//! Core data models used throughout elktail.
//!
//! These types represent the documents and pages that flow from the search
//! backend through deduplication to the output sink.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// A document returned by the search backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Backend identifier, unique within the index.
    pub id: String,
    /// Index the document was found in.
    pub index: String,
    /// Sort timestamp (millisecond precision).
    pub timestamp: DateTime<Utc>,
    /// Backend-native document body.
    pub source: Value,
}

impl Document {
    /// Ordering used for emission: timestamp first, then identifier.
    pub fn sort_cmp(&self, other: &Document) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Opaque pagination state handed back by the backend.
///
/// For Elasticsearch this holds the `search_after` sort values of the last
/// hit on a page. The tailing engine never looks inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationToken(Value);

impl ContinuationToken {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// One page of a result set.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub documents: Vec<Document>,
    /// Token for the next page, if the backend provided one.
    pub next: Option<ContinuationToken>,
    /// Whether the backend may have more documents after this page.
    pub has_more: bool,
    /// Total number of matching documents, when the backend reports it.
    pub total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(id: &str, ms: i64) -> Document {
        Document {
            id: id.to_string(),
            index: "logs".to_string(),
            timestamp: Utc.timestamp_millis_opt(ms).unwrap(),
            source: Value::Null,
        }
    }

    #[test]
    fn sort_by_timestamp_then_id() {
        let mut docs = vec![doc("c", 2), doc("a", 3), doc("b", 2)];
        docs.sort_by(Document::sort_cmp);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
