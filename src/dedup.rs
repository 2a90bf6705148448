//! Drop documents that a previous cycle already emitted.
//!
//! The filter runs against the cursor snapshot taken when the cycle started.
//! Only documents at exactly the cursor timestamp can be duplicates; anything
//! older is stale and anything newer is always kept.

use std::collections::HashSet;

use tracing::warn;

use crate::cursor::Cursor;
use crate::error::TailError;
use crate::models::Document;

/// Result of filtering one cycle's documents.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Documents to emit, in input order.
    pub fresh: Vec<Document>,
    /// Documents already emitted at the cursor timestamp.
    pub duplicates: usize,
    /// Documents sorted behind the cursor.
    pub stale: usize,
}

/// Filter `documents` against `cursor`.
///
/// A document is dropped when it is older than the cursor, when it sits at
/// the cursor timestamp with an identifier the cursor holds, or when the same
/// identifier was already kept earlier in this batch.
pub fn filter(cursor: Option<&Cursor>, documents: Vec<Document>) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    let mut kept: HashSet<String> = HashSet::new();

    for doc in documents {
        if let Some(cursor) = cursor {
            if doc.timestamp < cursor.timestamp {
                let err = TailError::Stale {
                    id: doc.id.clone(),
                    timestamp: doc.timestamp,
                    cursor: cursor.timestamp,
                };
                warn!(index = %doc.index, "{}", err);
                outcome.stale += 1;
                continue;
            }
            if doc.timestamp == cursor.timestamp && cursor.contains(&doc.id) {
                outcome.duplicates += 1;
                continue;
            }
        }
        if !kept.insert(doc.id.clone()) {
            outcome.duplicates += 1;
            continue;
        }
        outcome.fresh.push(doc);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::Value;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn doc(id: &str, ms: i64) -> Document {
        Document {
            id: id.to_string(),
            index: "logs".to_string(),
            timestamp: ts(ms),
            source: Value::Null,
        }
    }

    fn fresh_ids(outcome: &DedupOutcome) -> Vec<&str> {
        outcome.fresh.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn no_cursor_keeps_everything() {
        let out = filter(None, vec![doc("a", 1), doc("b", 2), doc("c", 2)]);
        assert_eq!(fresh_ids(&out), vec!["a", "b", "c"]);
        assert_eq!(out.duplicates, 0);
        assert_eq!(out.stale, 0);
    }

    #[test]
    fn drops_ids_seen_at_cursor_timestamp() {
        let mut cursor = Cursor::at(ts(2));
        cursor.ids.insert("b".into());
        cursor.ids.insert("c".into());

        let out = filter(Some(&cursor), vec![doc("c", 2), doc("d", 2), doc("e", 3)]);
        assert_eq!(fresh_ids(&out), vec!["d", "e"]);
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn same_id_at_newer_timestamp_is_kept() {
        let mut cursor = Cursor::at(ts(2));
        cursor.ids.insert("b".into());

        let out = filter(Some(&cursor), vec![doc("b", 3)]);
        assert_eq!(fresh_ids(&out), vec!["b"]);
    }

    #[test]
    fn stale_documents_are_counted_and_dropped() {
        let cursor = Cursor::at(ts(10));
        let out = filter(Some(&cursor), vec![doc("old", 9), doc("new", 10)]);
        assert_eq!(fresh_ids(&out), vec!["new"]);
        assert_eq!(out.stale, 1);
    }

    #[test]
    fn repeated_id_within_batch_is_dropped() {
        let out = filter(None, vec![doc("a", 1), doc("a", 1), doc("b", 1)]);
        assert_eq!(fresh_ids(&out), vec!["a", "b"]);
        assert_eq!(out.duplicates, 1);
    }
}
