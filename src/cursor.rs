//! High-water-mark tracking across poll cycles.
//!
//! The [`CursorTracker`] remembers the timestamp of the newest document that
//! was written to the sink, together with every identifier written at that
//! exact timestamp. The next cycle queries with an *inclusive* lower bound on
//! that timestamp and relies on [`crate::dedup`] to drop the identifiers the
//! cursor already holds. An exclusive bound would lose documents that arrive
//! later with the same timestamp as ones already emitted.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::Document;

/// Where the first cycle starts when no cursor has been recorded yet.
///
/// There is intentionally no `Default`: callers must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Only documents stamped at or after process start.
    Now,
    /// Everything the query matches, oldest first.
    Earliest,
    /// Documents stamped at or after the given instant.
    After(DateTime<Utc>),
}

/// The high-water mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub timestamp: DateTime<Utc>,
    /// Identifiers already emitted at exactly `timestamp`.
    #[serde(default)]
    pub ids: BTreeSet<String>,
}

impl Cursor {
    /// A cursor at `timestamp` that has not emitted anything there yet.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ids: BTreeSet::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

/// Single-writer owner of the [`Cursor`].
#[derive(Debug, Clone, Default)]
pub struct CursorTracker {
    cursor: Option<Cursor>,
}

impl CursorTracker {
    pub fn new(cursor: Option<Cursor>) -> Self {
        Self { cursor }
    }

    /// Build the initial tracker for a start position, resolving `Now`
    /// against the supplied clock reading.
    ///
    /// The start is truncated to whole milliseconds, the precision of the
    /// range bound sent to the backend.
    pub fn from_start(start: StartPosition, now: DateTime<Utc>) -> Self {
        let cursor = match start {
            StartPosition::Now => Some(Cursor::at(truncate_to_millis(now))),
            StartPosition::Earliest => None,
            StartPosition::After(ts) => Some(Cursor::at(truncate_to_millis(ts))),
        };
        Self { cursor }
    }

    /// Inclusive lower bound for the next query, if any.
    pub fn lower_bound(&self) -> Option<DateTime<Utc>> {
        self.cursor.as_ref().map(|c| c.timestamp)
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Record documents that were written to the sink.
    ///
    /// `emitted` must be in ascending timestamp order. Documents behind the
    /// cursor are ignored. Returns `true` if the cursor changed.
    pub fn advance(&mut self, emitted: &[Document]) -> bool {
        let mut changed = false;
        for doc in emitted {
            match &mut self.cursor {
                Some(cursor) if doc.timestamp < cursor.timestamp => {}
                Some(cursor) if doc.timestamp == cursor.timestamp => {
                    changed |= cursor.ids.insert(doc.id.clone());
                }
                slot => {
                    let mut next = Cursor::at(doc.timestamp);
                    next.ids.insert(doc.id.clone());
                    *slot = Some(next);
                    changed = true;
                }
            }
        }
        changed
    }
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.timestamp_millis())
        .single()
        .unwrap_or(ts)
}
