//! A minimal Elasticsearch `_search` endpoint for integration tests.
//!
//! Serves a fixed set of documents sorted by `(timestamp, id)` and honours
//! `size`, the `gte` range filter, and `search_after`. Canned error
//! responses can be queued ahead of the normal behaviour.

#![allow(dead_code)]

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub index: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Default)]
pub struct MockState {
    /// `(epoch millis, id)` pairs.
    docs: Mutex<Vec<(i64, String)>>,
    canned: Mutex<VecDeque<(StatusCode, Value)>>,
    requests: Mutex<Vec<Recorded>>,
}

pub struct MockElasticsearch {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockElasticsearch {
    /// Bind a free port on localhost and serve in the background.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/{index}/_search", post(search))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn add(&self, docs: &[(i64, &str)]) {
        self.state
            .docs
            .lock()
            .unwrap()
            .extend(docs.iter().map(|(ms, id)| (*ms, id.to_string())));
    }

    /// Answer the next request with `status` and `body` instead of hits.
    pub fn respond_next(&self, status: StatusCode, body: Value) {
        self.state.canned.lock().unwrap().push_back((status, body));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }
}

pub fn millis_to_rfc3339(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .unwrap()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn search(
    State(state): State<Arc<MockState>>,
    Path(index): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.requests.lock().unwrap().push(Recorded {
        index,
        query,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        body: body.clone(),
    });

    if let Some((status, canned)) = state.canned.lock().unwrap().pop_front() {
        return (status, Json(canned));
    }

    let size = body["size"].as_u64().unwrap_or(10) as usize;
    let gte = body["query"]["bool"]["filter"][0]["range"]["@timestamp"]["gte"]
        .as_str()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .unwrap()
                .with_timezone(&Utc)
                .timestamp_millis()
        });
    let after = body["search_after"]
        .as_array()
        .map(|a| (a[0].as_i64().unwrap(), a[1].as_str().unwrap().to_string()));

    let mut docs: Vec<(i64, String)> = state
        .docs
        .lock()
        .unwrap()
        .iter()
        .filter(|(ms, _)| gte.map_or(true, |g| *ms >= g))
        .cloned()
        .collect();
    docs.sort();
    let total = docs.len();
    if let Some(after) = after {
        docs.retain(|d| *d > after);
    }
    docs.truncate(size);

    let hits: Vec<Value> = docs
        .iter()
        .map(|(ms, id)| {
            json!({
                "_index": "logs-2024.05.01",
                "_id": id,
                "_source": { "@timestamp": millis_to_rfc3339(*ms), "message": format!("event {}", id) },
                "sort": [ms, id],
            })
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "took": 1,
            "timed_out": false,
            "hits": { "total": { "value": total, "relation": "eq" }, "hits": hits },
        })),
    )
}
