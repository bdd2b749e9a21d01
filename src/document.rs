//! `RenderedDocument` data model and the `DocumentParser` external contract
//! (spec.md §3, §4.7). Per spec.md §4.7's explicit carve-out, the internal
//! HTML-walking logic (heading cascade, section-to-markdown conversion) is
//! NOT implemented here — only the trait surface the comparison engine
//! depends on, plus a minimal conformance double used by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Section {
    pub section_id: String,
    pub heading_level: u8,
    pub heading_text: String,
    pub body_markdown: String,
    pub detection_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LinkEntry {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImageEntry {
    pub src: String,
    pub alt: String,
}

/// Parser output consumed by the comparison engine (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RenderedDocument {
    pub title: String,
    pub meta_description: String,
    pub canonical_url: String,
    pub meta_robots: String,
    pub indexable: bool,
    pub follow: bool,
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    pub word_count: usize,
    pub body_text: String,
    pub text_to_html_ratio: f64,
    pub href_langs: Vec<String>,
    pub links: Vec<LinkEntry>,
    pub images: Vec<ImageEntry>,
    pub open_graph: HashMap<String, String>,
    pub structured_data: Vec<Value>,
    pub sections: Vec<Section>,
}

/// Optional HTTP context available alongside the raw HTML (spec.md §4.7):
/// the `Link` header and `X-Robots-Tag` header, when present.
#[derive(Debug, Clone, Default)]
pub struct HttpContext {
    pub link_header: Option<String>,
    pub x_robots_tag: Option<String>,
}

/// External contract: produces a `RenderedDocument` from an HTML string,
/// the page URL, and optional HTTP context. See spec.md §4.7 for the full
/// set of rules a conforming implementation must follow; this crate does
/// not ship that implementation.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(
        &self,
        html: &str,
        page_url: &str,
        context: &HttpContext,
    ) -> RenderedDocumentResult;
}

pub type RenderedDocumentResult = Result<RenderedDocument, DocumentParseError>;

#[derive(Debug, Clone, thiserror::Error)]
#[error("document parse failed: {0}")]
pub struct DocumentParseError(pub String);

/// A minimal conformance double: wraps a `RenderedDocument` the caller
/// already has (e.g. built directly in a test) rather than actually parsing
/// HTML. Useful for exercising the comparison engine and orchestrator
/// plumbing without depending on the unimplemented parsing internals.
#[derive(Debug, Clone, Default)]
pub struct FixedDocumentParser {
    pub document: RenderedDocument,
}

impl FixedDocumentParser {
    pub fn new(document: RenderedDocument) -> Self {
        Self { document }
    }
}

#[async_trait]
impl DocumentParser for FixedDocumentParser {
    async fn parse(
        &self,
        _html: &str,
        _page_url: &str,
        _context: &HttpContext,
    ) -> RenderedDocumentResult {
        Ok(self.document.clone())
    }
}
