//! The search backend seam.
//!
//! The tailing engine only talks to the backend through [`SearchBackend`].
//! [`crate::elasticsearch::ElasticsearchBackend`] is the production
//! implementation; tests implement the trait in memory.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use elktail::backend::SearchBackend;
//! use elktail::error::TailResult;
//! use elktail::models::{ContinuationToken, Page};
//! use elktail::query::SearchRequest;
//!
//! pub struct EmptyBackend;
//!
//! #[async_trait]
//! impl SearchBackend for EmptyBackend {
//!     fn name(&self) -> &str { "empty" }
//!
//!     async fn search(
//!         &self,
//!         _request: &SearchRequest,
//!         _after: Option<&ContinuationToken>,
//!     ) -> TailResult<Page> {
//!         Ok(Page::default())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::TailResult;
use crate::models::{ContinuationToken, Page};
use crate::query::SearchRequest;

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short label used in log lines.
    fn name(&self) -> &str;

    /// Fetch one page of `request`, resuming after `after` when given.
    ///
    /// Implementations perform exactly one round trip and classify failures
    /// as [`crate::error::TailError::Transient`],
    /// [`crate::error::TailError::Fatal`], or
    /// [`crate::error::TailError::InvalidQuery`].
    async fn search(
        &self,
        request: &SearchRequest,
        after: Option<&ContinuationToken>,
    ) -> TailResult<Page>;
}
