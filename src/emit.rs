//! Line-delimited JSON output.
//!
//! Each emitted document becomes one line:
//!
//! ```json
//! {"timestamp":"2024-01-01T00:00:00.123Z","id":"abc","source":{"message":"..."}}
//! ```
//!
//! Each record is written with a single `write_all` call so a slow consumer
//! applies backpressure to the poll loop.

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{TailError, TailResult};
use crate::models::Document;

#[derive(Serialize)]
struct Record<'a> {
    timestamp: String,
    id: &'a str,
    source: &'a Value,
}

/// Encode a document as one output line, including the trailing newline.
pub fn encode_line(doc: &Document) -> TailResult<Vec<u8>> {
    let record = Record {
        timestamp: doc.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        id: &doc.id,
        source: &doc.source,
    };
    let mut line = serde_json::to_vec(&record)
        .map_err(|e| TailError::Sink(std::io::Error::other(e)))?;
    line.push(b'\n');
    Ok(line)
}

/// Writes documents to an async sink.
pub struct Emitter<W> {
    sink: W,
}

impl<W: AsyncWrite + Unpin> Emitter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Write one document.
    pub async fn emit(&mut self, doc: &Document) -> TailResult<()> {
        let line = encode_line(doc)?;
        self.sink.write_all(&line).await.map_err(TailError::Sink)
    }

    pub async fn flush(&mut self) -> TailResult<()> {
        self.sink.flush().await.map_err(TailError::Sink)
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn doc(id: &str, ms: i64) -> Document {
        Document {
            id: id.to_string(),
            index: "logs".to_string(),
            timestamp: Utc.timestamp_millis_opt(ms).unwrap(),
            source: json!({ "message": format!("hello {}", id) }),
        }
    }

    #[test]
    fn record_format() {
        let line = encode_line(&doc("abc", 1_704_067_200_123)).unwrap();
        let text = String::from_utf8(line).unwrap();
        assert!(text.ends_with('\n'));
        let value: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(
            value,
            json!({
                "timestamp": "2024-01-01T00:00:00.123Z",
                "id": "abc",
                "source": { "message": "hello abc" }
            })
        );
    }

    #[tokio::test]
    async fn one_line_per_document() {
        let mut emitter = Emitter::new(Vec::new());
        emitter.emit(&doc("a", 1)).await.unwrap();
        emitter.emit(&doc("b", 2)).await.unwrap();
        emitter.flush().await.unwrap();

        let out = String::from_utf8(emitter.into_inner()).unwrap();
        let ids: Vec<String> = out
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
