//! Top-level CompareService: composes the render orchestrator, the plain
//! fetcher, the document parser, and the comparison engine into one
//! operation that renders a URL both ways and diffs the results.
//!
//! Wraps each side in a `FetchStatus` (spec.md §7) so that one side failing
//! still yields a useful response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compare::{self, CompareDiff, RenderingImpact};
use crate::config::RenderOptions;
use crate::document::{DocumentParser, HttpContext};
use crate::error::CoreError;
use crate::orchestrator::{CancelScope, RenderOrchestrator};
use crate::plain_fetcher::{FetchOptions, PlainFetcher};
use crate::pool::BrowserPool;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FetchStatus {
    pub success: bool,
    pub status_code: u16,
    pub render_time_seconds: f64,
    pub error: Option<String>,
}

pub struct CompareOutcome {
    pub js_status: FetchStatus,
    pub non_js_status: FetchStatus,
    pub diff: Option<CompareDiff>,
    pub impact: Option<RenderingImpact>,
}

pub struct CompareService {
    pool: Arc<BrowserPool>,
    fetcher: Arc<dyn PlainFetcher>,
    parser: Arc<dyn DocumentParser>,
}

impl CompareService {
    pub fn new(pool: Arc<BrowserPool>, fetcher: Arc<dyn PlainFetcher>, parser: Arc<dyn DocumentParser>) -> Self {
        Self {
            pool,
            fetcher,
            parser,
        }
    }

    pub async fn compare(&self, url: &str, render_options: &RenderOptions) -> Result<CompareOutcome, CoreError> {
        let instance = self.pool.acquire().await?;

        let (render_result, render_error) =
            RenderOrchestrator::render(&instance, render_options, CancelScope::new()).await;
        self.pool.release(&instance).await;

        let js_status = FetchStatus {
            success: render_error.is_none(),
            status_code: render_result.as_ref().map(|r| r.status_code).unwrap_or(0),
            render_time_seconds: render_result.as_ref().map(|r| r.render_time_seconds).unwrap_or(0.0),
            error: render_error.as_ref().map(|e| e.to_string()),
        };

        let fetch_options = FetchOptions::default();
        let fetch_result = self.fetcher.fetch(url, &fetch_options).await;

        let non_js_status = match &fetch_result {
            Ok(r) => FetchStatus {
                success: true,
                status_code: r.status_code,
                render_time_seconds: r.elapsed_seconds,
                error: None,
            },
            Err(e) => FetchStatus {
                success: false,
                status_code: 0,
                render_time_seconds: 0.0,
                error: Some(e.to_string()),
            },
        };

        let (diff, impact) = match (&render_result, &fetch_result) {
            (Some(render), Ok(fetch)) => {
                let js_doc = self
                    .parser
                    .parse(&render.html, &render.final_url, &HttpContext::default())
                    .await;
                let non_js_doc = self
                    .parser
                    .parse(&fetch.body, &fetch.final_url, &HttpContext::default())
                    .await;
                match (js_doc, non_js_doc) {
                    (Ok(js_doc), Ok(non_js_doc)) => {
                        let diff = compare::diff(&js_doc, &non_js_doc);
                        let impact = compare::classify_impact(&js_doc, &non_js_doc, &diff);
                        (Some(diff), Some(impact))
                    }
                    _ => (None, None),
                }
            }
            _ => (None, None),
        };

        Ok(CompareOutcome {
            js_status,
            non_js_status,
            diff,
            impact,
        })
    }
}
