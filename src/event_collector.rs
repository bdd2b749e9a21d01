//! EventCollector (spec.md §4.4): fan-in of browser-control-channel events
//! during a single render; produces deterministic, post-render snapshots.
//!
//! Grounded on the corpus's `page.event_listener::<EventX>()` /
//! `EventStream` subscription pattern (see
//! `cyrup-ai-kodegen-tools-citescrape/src/content_saver/cache_check.rs`),
//! generalized from a single response-received consumer into the full set
//! of contracts spec.md §4.4 requires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use url::Url;

use crate::blocklist::Blocklist;
use crate::url_equiv::urls_equivalent;

#[derive(Debug, Clone, Default)]
pub struct NetworkRequestEntry {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub resource_type: String,
    pub start: Option<Instant>,
    pub end: Option<Instant>,
    pub status: u16,
    pub size_bytes: u64,
    pub received_bytes: u64,
    pub failed: bool,
    pub failure_reason: Option<String>,
    pub blocked: bool,
}

#[derive(Debug, Clone)]
pub struct NetworkRequest {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub resource_type: String,
    pub status: u16,
    pub size: u64,
    pub duration_seconds: f64,
    pub is_internal: bool,
    pub blocked: bool,
    pub failed: bool,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConsoleMessage {
    pub id: String,
    pub level: String,
    pub text: String,
    pub timestamp_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct JSError {
    pub text: String,
    pub source_url: String,
    pub line: i64,
    pub column: i64,
    pub stack: String,
}

#[derive(Debug, Clone, Default)]
pub struct RedirectInfo {
    pub redirect_url: Option<String>,
    pub redirect_status: u16,
}

struct State {
    requests: HashMap<String, NetworkRequestEntry>,
    console_messages: Vec<ConsoleMessage>,
    js_errors: Vec<JSError>,
    lifecycle_events: HashMap<String, Instant>,
    error_console: String,
    redirect: RedirectInfo,
    main_frame_id: Option<String>,
    main_loader_id: Option<String>,
}

const ERROR_CONSOLE_CAP: usize = 5120;

/// Fans in CDP events for one render. Mutex-guarded except the in-flight
/// fetch-handler counter, which is a standalone atomic so
/// `wait_for_fetch_handlers` can poll it without contending the main lock.
pub struct EventCollector {
    state: Mutex<State>,
    page_url: String,
    start: Instant,
    in_flight_fetch_handlers: AtomicI64,
}

impl EventCollector {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State {
                requests: HashMap::new(),
                console_messages: Vec::new(),
                js_errors: Vec::new(),
                lifecycle_events: HashMap::new(),
                error_console: String::new(),
                redirect: RedirectInfo::default(),
                main_frame_id: None,
                main_loader_id: None,
            }),
            page_url: page_url.into(),
            start: Instant::now(),
            in_flight_fetch_handlers: AtomicI64::new(0),
        }
    }

    /// Seeds the committed main-navigation frame/loader ids so that
    /// lifecycle events from `about:blank` or prior navigations are ignored.
    pub async fn seed_main_navigation(&self, frame_id: String, loader_id: String) {
        let mut state = self.state.lock().await;
        state.main_frame_id = Some(frame_id);
        state.main_loader_id = Some(loader_id);
    }

    /// `document_url` is the event's own `documentURL` field — the URL of
    /// the document this request belongs to — and is distinct from `url`,
    /// the request's own target URL. Per spec.md §4.4 a redirect is only
    /// recorded when `documentURL` equals the *new* request's `url`, not
    /// when the redirect-response URL happens to equal it.
    pub async fn on_request_will_be_sent(
        &self,
        request_id: String,
        url: String,
        document_url: String,
        method: String,
        resource_type: String,
        redirect_response_url: Option<String>,
        redirect_response_status: u16,
    ) {
        let mut state = self.state.lock().await;

        if let Some(redirect_url) = &redirect_response_url {
            let document_url_matches = document_url == url;
            if urls_equivalent(redirect_url, &self.page_url)
                && document_url_matches
                && redirect_response_status != 0
            {
                state.redirect.redirect_url = Some(redirect_url.clone());
                state.redirect.redirect_status = redirect_response_status;
            }
        }

        let entry = state
            .requests
            .entry(request_id.clone())
            .or_insert_with(|| NetworkRequestEntry {
                request_id: request_id.clone(),
                ..Default::default()
            });
        entry.url = url;
        entry.method = method;
        entry.resource_type = resource_type;
        entry.start = Some(Instant::now());
    }

    pub async fn on_response_received(&self, request_id: &str, status: u16, encoded_data_length: i64) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.requests.get_mut(request_id) {
            entry.status = status;
            if encoded_data_length > 0 {
                entry.size_bytes = encoded_data_length as u64;
            }
            if entry.end.is_none() {
                entry.end = Some(Instant::now());
            }
        }
    }

    pub async fn on_loading_finished(&self, request_id: &str, encoded_data_length: i64) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.requests.get_mut(request_id) {
            entry.end = Some(Instant::now());
            if encoded_data_length > 0 {
                entry.size_bytes = encoded_data_length as u64;
            }
        }
    }

    pub async fn on_loading_failed(&self, request_id: &str, reason: String) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.requests.get_mut(request_id) {
            entry.failed = true;
            entry.failure_reason = Some(reason);
            entry.end = Some(Instant::now());
        }
    }

    pub async fn on_data_received(&self, request_id: &str, data_length: u64) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.requests.get_mut(request_id) {
            entry.received_bytes += data_length;
        }
    }

    /// Returns `true` if the request should be allowed to continue, `false`
    /// if it should be blocked. Any continue-request failure by the caller
    /// should fall back to denying, per spec.md §4.4.
    pub async fn on_request_paused(
        &self,
        blocklist: &Blocklist,
        request_id: &str,
        url: &str,
        resource_type: &str,
    ) -> bool {
        self.in_flight_fetch_handlers.fetch_add(1, Ordering::AcqRel);
        let blocked = blocklist.should_block(url, resource_type);
        {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.requests.get_mut(request_id) {
                entry.blocked = blocked;
            }
        }
        self.in_flight_fetch_handlers.fetch_sub(1, Ordering::AcqRel);
        !blocked
    }

    pub async fn on_console_api_called(&self, call_type: String, args: Vec<String>) {
        let mut state = self.state.lock().await;
        let text = args.join(" ");
        let id = format!("console-{}", state.console_messages.len() + 1);
        let timestamp_seconds = self.start.elapsed().as_secs_f64();
        let is_error = call_type.eq_ignore_ascii_case("error");
        state.console_messages.push(ConsoleMessage {
            id,
            level: call_type,
            text: text.clone(),
            timestamp_seconds,
        });
        if is_error {
            push_bounded(&mut state.error_console, &text, ERROR_CONSOLE_CAP);
        }
    }

    pub async fn on_exception_thrown(&self, text: String, source_url: String, line: i64, column: i64, stack_frames: Vec<String>) {
        let mut state = self.state.lock().await;
        state.js_errors.push(JSError {
            text,
            source_url,
            line,
            column,
            stack: stack_frames.join("\n"),
        });
    }

    pub async fn on_lifecycle_event(&self, frame_id: &str, loader_id: &str, name: String) {
        let mut state = self.state.lock().await;
        let matches_main = state.main_frame_id.as_deref() == Some(frame_id)
            && state.main_loader_id.as_deref() == Some(loader_id);
        if matches_main {
            state.lifecycle_events.insert(name, Instant::now());
        }
    }

    /// Excludes the main document: the request whose resource type is
    /// `Document` and whose URL matches the page URL.
    pub async fn network_results(&self) -> Vec<NetworkRequest> {
        let state = self.state.lock().await;
        let page_host = Url::parse(&self.page_url).ok().and_then(|u| u.host_str().map(str::to_string));

        state
            .requests
            .values()
            .filter(|e| !(e.resource_type.eq_ignore_ascii_case("document") && urls_equivalent(&e.url, &self.page_url)))
            .map(|e| {
                let duration_seconds = match (e.start, e.end) {
                    (Some(s), Some(end)) => (end - s).as_secs_f64(),
                    _ => 0.0,
                };
                let size = if e.size_bytes > 0 { e.size_bytes } else { e.received_bytes };
                let is_internal = is_internal_host(&e.url, page_host.as_deref());
                NetworkRequest {
                    request_id: e.request_id.clone(),
                    url: e.url.clone(),
                    method: e.method.clone(),
                    resource_type: e.resource_type.clone(),
                    status: e.status,
                    size,
                    duration_seconds,
                    is_internal,
                    blocked: e.blocked,
                    failed: e.failed,
                    failure_reason: e.failure_reason.clone(),
                }
            })
            .collect()
    }

    pub async fn console_results(&self) -> Vec<ConsoleMessage> {
        self.state.lock().await.console_messages.clone()
    }

    pub async fn error_console(&self) -> String {
        self.state.lock().await.error_console.clone()
    }

    pub async fn js_errors(&self) -> Vec<JSError> {
        self.state.lock().await.js_errors.clone()
    }

    pub async fn lifecycle_results(&self) -> HashMap<String, Duration> {
        let state = self.state.lock().await;
        state
            .lifecycle_events
            .iter()
            .map(|(name, instant)| (name.clone(), instant.saturating_duration_since(self.start)))
            .collect()
    }

    pub async fn active_request_count(&self) -> usize {
        let state = self.state.lock().await;
        state.requests.values().filter(|e| e.end.is_none() && !e.failed).count()
    }

    pub async fn redirect_info(&self) -> RedirectInfo {
        self.state.lock().await.redirect.clone()
    }

    /// Polls the in-flight fetch-handler counter every 50ms until zero or
    /// `timeout` elapses.
    pub async fn wait_for_fetch_handlers(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.in_flight_fetch_handlers.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(50)).await;
        }
    }
}

fn push_bounded(buf: &mut String, addition: &str, cap: usize) {
    if buf.len() >= cap {
        return;
    }
    let remaining = cap - buf.len();
    if addition.len() <= remaining {
        buf.push_str(addition);
        buf.push('\n');
    } else {
        let mut boundary = remaining.min(addition.len());
        while boundary > 0 && !addition.is_char_boundary(boundary) {
            boundary -= 1;
        }
        buf.push_str(&addition[..boundary]);
    }
}

fn is_internal_host(url: &str, page_host: Option<&str>) -> bool {
    let (Some(page_host), Ok(parsed)) = (page_host, Url::parse(url)) else {
        return false;
    };
    match parsed.host_str() {
        Some(host) => host.eq_ignore_ascii_case(page_host) || host.to_lowercase().ends_with(&format!(".{}", page_host.to_lowercase())),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn main_document_excluded_from_network_results() {
        let collector = EventCollector::new("https://example.com/");
        collector
            .on_request_will_be_sent(
                "1".to_string(),
                "https://example.com/".to_string(),
                "https://example.com/".to_string(),
                "GET".to_string(),
                "Document".to_string(),
                None,
                0,
            )
            .await;
        collector
            .on_request_will_be_sent(
                "2".to_string(),
                "https://example.com/app.js".to_string(),
                "https://example.com/".to_string(),
                "GET".to_string(),
                "Script".to_string(),
                None,
                0,
            )
            .await;
        let results = collector.network_results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/app.js");
        assert!(results[0].is_internal);
    }

    #[tokio::test]
    async fn redirect_recorded_only_on_matching_document_url() {
        let collector = EventCollector::new("https://example.com/old");
        // documentURL doesn't match the new request's own url: not recorded
        // even though the redirect-response URL and a non-zero status are
        // both present.
        collector
            .on_request_will_be_sent(
                "1".to_string(),
                "https://example.com/new".to_string(),
                "https://example.com/unrelated".to_string(),
                "GET".to_string(),
                "Document".to_string(),
                Some("https://example.com/old".to_string()),
                301,
            )
            .await;
        assert!(collector.redirect_info().await.redirect_url.is_none());

        // documentURL equals the new request's url: recorded.
        collector
            .on_request_will_be_sent(
                "2".to_string(),
                "https://example.com/new".to_string(),
                "https://example.com/new".to_string(),
                "GET".to_string(),
                "Document".to_string(),
                Some("https://example.com/old".to_string()),
                301,
            )
            .await;
        let info = collector.redirect_info().await;
        assert_eq!(info.redirect_status, 301);
    }

    #[tokio::test]
    async fn console_ids_assigned_in_arrival_order() {
        let collector = EventCollector::new("https://example.com/");
        collector.on_console_api_called("log".to_string(), vec!["a".to_string()]).await;
        collector.on_console_api_called("log".to_string(), vec!["b".to_string()]).await;
        let results = collector.console_results().await;
        assert_eq!(results[0].id, "console-1");
        assert_eq!(results[1].id, "console-2");
    }

    #[tokio::test]
    async fn error_console_bounded_to_cap() {
        let collector = EventCollector::new("https://example.com/");
        for _ in 0..2000 {
            collector
                .on_console_api_called("error".to_string(), vec!["x".repeat(10)])
                .await;
        }
        assert!(collector.error_console().await.len() <= ERROR_CONSOLE_CAP);
    }

    #[tokio::test]
    async fn lifecycle_event_ignored_unless_main_navigation() {
        let collector = EventCollector::new("https://example.com/");
        collector.seed_main_navigation("frame-1".to_string(), "loader-1".to_string()).await;
        collector.on_lifecycle_event("frame-0", "loader-0", "load".to_string()).await;
        assert!(collector.lifecycle_results().await.is_empty());
        collector.on_lifecycle_event("frame-1", "loader-1", "load".to_string()).await;
        assert_eq!(collector.lifecycle_results().await.len(), 1);
    }
}
