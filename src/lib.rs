//! # Render Comparison Core
//!
//! Core of a web-rendering comparison service: a browser instance pool, a
//! render orchestrator, and a comparison engine, sharing one data model.
//!
//! Given a URL, this crate can render it both through a headless Chrome
//! instance (picking up client-side JavaScript) and through a plain HTTP
//! fetch, parse both into a structured document, and produce a deterministic
//! diff between them along with a classified rendering impact.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use render_compare_core::config::PoolConfig;
//! use render_compare_core::pool::BrowserPool;
//! use render_compare_core::net_guard::DefaultNetGuard;
//! use render_compare_core::plain_fetcher::ReqwestPlainFetcher;
//! use render_compare_core::document::FixedDocumentParser;
//! use render_compare_core::compare_service::CompareService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = BrowserPool::new(PoolConfig::default()).await?;
//!     let fetcher = Arc::new(ReqwestPlainFetcher::new(Arc::new(DefaultNetGuard::new())));
//!     let parser = Arc::new(FixedDocumentParser::default());
//!     let service = CompareService::new(pool, fetcher, parser);
//!
//!     let options = render_compare_core::config::RenderOptions::new("https://example.com");
//!     let outcome = service.compare("https://example.com", &options).await?;
//!     println!("overall change: {:?}", outcome.impact.map(|i| i.overall_change));
//!     Ok(())
//! }
//! ```
//!
//! Three boundaries are deliberately external contracts rather than fixed
//! internals: [`document::DocumentParser`]'s HTML-walking logic (a minimal
//! conformance double is provided), and concrete (but substitutable)
//! implementations of [`net_guard::NetGuard`] and [`plain_fetcher::PlainFetcher`].

/// Configuration types recognized by the pool, instances, and orchestrator.
pub mod config;

/// Error taxonomy shared across the crate.
pub mod error;

/// Request-intercept denial policy.
pub mod blocklist;

/// URL equivalence helper used for redirect detection.
pub mod url_equiv;

/// SSRF-prevention predicate.
pub mod net_guard;

/// Browser instance lifecycle: make-before-break restart, health probing.
pub mod instance;

/// Bounded pool of browser instances with non-blocking acquisition.
pub mod pool;

/// Fan-in of browser-control-channel events during one render.
pub mod event_collector;

/// Drives one navigation to produce one `RenderResult`.
pub mod orchestrator;

/// Rendered-document data model and the `DocumentParser` external contract.
pub mod document;

/// Deterministic diff between two rendered documents.
pub mod compare;

/// Plain (non-JS) HTTP fetch, external contract with a concrete implementation.
pub mod plain_fetcher;

/// Top-level service composing the pool, orchestrator, fetcher, and parser.
pub mod compare_service;

/// Ambient observability counters and gauges.
pub mod metrics;

/// Ambient logging initialization.
pub mod logging;

#[cfg(test)]
mod tests;

pub use compare_service::{CompareOutcome, CompareService, FetchStatus};
pub use error::{CoreError, ErrorSeverity, InstanceError, NetGuardError, PoolError, RenderError};
