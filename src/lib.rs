//! # elktail
//!
//! Follow an Elasticsearch index the way `tail -f` follows a file.
//!
//! elktail turns a one-shot search into a poll loop: every tick it queries
//! for documents at or after its cursor, pages through the whole result set
//! with `search_after`, drops documents it already printed, writes the rest
//! to stdout as JSON lines, and moves the cursor forward.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐   ┌─────────┐
//! │  query   │──▶│    fetch    │──▶│   dedup   │──▶│  emit   │──▶ stdout
//! │ builder  │   │ retry/pages │   │ vs cursor │   │ JSONL   │
//! └────▲─────┘   └──────┬──────┘   └───────────┘   └────┬────┘
//!      │                ▼                               │
//!      │        ┌──────────────┐                        │
//!      │        │ SearchBackend│ (Elasticsearch HTTP)   │
//!      │        └──────────────┘                        │
//!      └────────────── cursor ◀─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! elktail 'level:error' -i 'logstash-*' -u http://127.0.0.1:9200
//! elktail --from-start --list 'service:api'
//! elktail --after 2024-01-01T00:00:00Z --checkpoint ./cursor.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Config file, defaults, validated run config |
//! | [`models`] | Documents, pages, continuation tokens |
//! | [`query`] | Search request construction |
//! | [`backend`] | Search backend trait |
//! | [`elasticsearch`] | Elasticsearch HTTP backend |
//! | [`fetch`] | Page fetching with retry and timeout |
//! | [`cursor`] | High-water-mark tracking |
//! | [`dedup`] | Duplicate and stale filtering |
//! | [`emit`] | JSON lines output |
//! | [`checkpoint`] | Optional on-disk cursor |
//! | [`tail`] | The poll loop |
//! | [`error`] | Error taxonomy |
//! | [`logging`] | Tracing subscriber setup for the binary |

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod cursor;
pub mod dedup;
pub mod elasticsearch;
pub mod emit;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod query;
pub mod tail;
