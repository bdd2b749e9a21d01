//! RenderOrchestrator (spec.md §4.5): drives one navigation to produce one
//! `RenderResult`, composing three independent timers (hard timeout via
//! caller cancellation, redirect-induced cancellation, soft wait-event
//! timeout) and four error classes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventDataReceived, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, NavigateParams};
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, EventExceptionThrown};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::blocklist::Blocklist;
use crate::config::RenderOptions;
use crate::error::RenderError;
use crate::event_collector::{ConsoleMessage, EventCollector, JSError, NetworkRequest};
use crate::instance::BrowserInstance;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEventRecord {
    pub event: String,
    pub time_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct RenderResult {
    pub html: String,
    pub final_url: String,
    pub redirect_url: Option<String>,
    pub status_code: u16,
    pub page_size_bytes: u64,
    pub render_time_seconds: f64,
    pub network: Vec<NetworkRequest>,
    pub console: Vec<ConsoleMessage>,
    pub error_console: String,
    pub js_errors: Vec<JSError>,
    pub lifecycle: Vec<LifecycleEventRecord>,
    pub screenshot: Option<Vec<u8>>,
}

/// A caller-supplied cancellation handle. Cancelling always wins over the
/// orchestrator's own redirect-induced cancellation (spec.md §4.5).
#[derive(Clone)]
pub struct CancelScope {
    notify: Arc<Notify>,
    cancelled: Arc<std::sync::atomic::AtomicBool>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::Acquire)
    }

    pub async fn with_deadline(&self, deadline: Duration) -> Self {
        let scope = self.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(deadline) => scope.cancel(),
                _ = notify.notified() => {}
            }
        });
        self.clone()
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RenderOrchestrator;

impl RenderOrchestrator {
    /// Runs the full pipeline described in spec.md §4.5. `caller_scope`
    /// carries the hard-timeout/caller-cancellation signal; it must not be
    /// shadowed by the orchestrator's own redirect-induced cancellation.
    pub async fn render(
        instance: &Arc<BrowserInstance>,
        options: &RenderOptions,
        caller_scope: CancelScope,
    ) -> (Option<RenderResult>, Option<RenderError>) {
        let start = Instant::now();
        let tab = match instance.get_tab_scope().await {
            Ok(tab) => tab,
            Err(e) => return (None, Some(RenderError::NavigationFailed(e.to_string()))),
        };

        let collector = Arc::new(EventCollector::new(options.url.clone()));
        let redirect_scope = CancelScope::new();

        // Step 1-3: install listeners before enabling domains; lifecycle
        // events, network domain, (fetch domain only if blocklist non-empty).
        Self::install_listeners(&tab, collector.clone(), options.blocklist.clone(), redirect_scope.clone()).await;

        // Step 4: UA + device metrics override. Non-fatal: a failed override
        // degrades fidelity but shouldn't sink an otherwise-working render.
        if let Some(ua) = &options.user_agent {
            let override_params = SetUserAgentOverrideParams {
                user_agent: ua.clone(),
                accept_language: None,
                platform: None,
                user_agent_metadata: None,
            };
            if let Err(e) = tab.page.execute(override_params).await {
                warn!("user-agent override failed (non-fatal): {e}");
            }
        }
        let viewport = options.effective_viewport();
        match SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(options.is_mobile)
            .build()
        {
            Ok(metrics_override) => {
                if let Err(e) = tab.page.execute(metrics_override).await {
                    warn!("device metrics override failed (non-fatal): {e}");
                }
            }
            Err(e) => warn!("device metrics override params invalid (non-fatal): {e}"),
        }

        // Step 5: navigate, capture the real frame/loader id from the CDP
        // response, seed the collector with them.
        let navigate_params = match NavigateParams::builder().url(options.url.clone()).build() {
            Ok(params) => params,
            Err(e) => {
                tab.release().await;
                return (None, Some(RenderError::NavigationFailed(e)));
            }
        };
        let nav_result = match tab.page.execute(navigate_params).await {
            Ok(result) => result,
            Err(e) => {
                tab.release().await;
                return (None, Some(RenderError::NavigationFailed(e.to_string())));
            }
        };
        if let Some(error_text) = &nav_result.error_text {
            tab.release().await;
            return (None, Some(RenderError::NavigationFailed(error_text.clone())));
        }
        let frame_id = nav_result.frame_id.inner().clone();
        let loader_id = nav_result
            .loader_id
            .as_ref()
            .map(|id| id.inner().clone())
            .unwrap_or_default();
        collector.seed_main_navigation(frame_id, loader_id).await;

        // Step 6: wait for requested lifecycle event with a SOFT timeout.
        let soft_deadline = options.soft_timeout;
        let wait_result = timeout(soft_deadline, Self::wait_for_event(&collector, options)).await;
        let timed_out_soft = wait_result.is_err();
        if timed_out_soft {
            debug!("soft timeout waiting for {:?}", options.wait_event);
        }

        // Hard-timeout / caller-cancellation check takes priority over
        // everything that follows.
        if caller_scope.is_cancelled() {
            let partial = Self::build_partial(&tab, &collector, start, None).await;
            tab.release().await;
            return (Some(partial), Some(RenderError::HardTimeout));
        }

        // Redirect detection: if a 3xx was captured for the main document,
        // the orchestrator's own cancellation fires; treat as success iff
        // the caller scope is still live and a 3xx was captured.
        let redirect = collector.redirect_info().await;
        if let Some(redirect_url) = redirect.redirect_url.clone() {
            if redirect.redirect_status >= 300 && redirect.redirect_status < 400 {
                redirect_scope.cancel();
                if !caller_scope.is_cancelled() {
                    let mut result = Self::build_partial(&tab, &collector, start, Some(redirect_url.clone())).await;
                    result.status_code = redirect.redirect_status;
                    result.final_url = redirect_url;
                    tab.release().await;
                    return (Some(result), None);
                }
            }
        }

        // Step 7-8: body ready/visible, extract HTML with retries.
        let html = match Self::extract_html_with_retries(&tab).await {
            Ok(html) => html,
            Err(e) => {
                let partial = Self::build_partial(&tab, &collector, start, None).await;
                tab.release().await;
                return (Some(partial), Some(RenderError::ExtractHTMLFailed(e)));
            }
        };

        // Step 9: final URL from browser location.
        let final_url = Self::current_location(&tab).await.unwrap_or_else(|| options.url.clone());

        // Step 10: status fallback via performance API.
        let mut status_code = redirect.redirect_status;
        if status_code == 0 {
            status_code = Self::status_via_performance_api(&tab).await.unwrap_or(0);
        }

        // Step 11: optional screenshot, non-fatal on failure.
        let screenshot = if options.capture_screenshot {
            match Self::capture_screenshot(&tab).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("screenshot capture failed (non-fatal): {e}");
                    None
                }
            }
        } else {
            None
        };

        // Step 12: drain in-flight fetch handlers.
        collector.wait_for_fetch_handlers(Duration::from_secs(5)).await;

        // Step 13: close the tab.
        tab.release().await;

        let page_size_bytes = html.len() as u64;
        let network = collector.network_results().await;
        let console = collector.console_results().await;
        let error_console = collector.error_console().await;
        let js_errors = collector.js_errors().await;
        let lifecycle = Self::lifecycle_records(&collector, start).await;

        let result = RenderResult {
            html,
            final_url,
            redirect_url: redirect.redirect_url,
            status_code,
            page_size_bytes,
            render_time_seconds: start.elapsed().as_secs_f64(),
            network,
            console,
            error_console,
            js_errors,
            lifecycle,
            screenshot,
        };

        if result.status_code == 0 {
            return (Some(result), Some(RenderError::StatusCaptureFailed));
        }

        (Some(result), None)
    }

    /// Subscribes to the CDP event set spec.md §4.4 requires and spawns one
    /// dispatch task per event type, each feeding `collector`. A subscribe
    /// failure on any one event type is logged and does not block the
    /// others; an unreachable render still returns, just undercounted.
    async fn install_listeners(
        tab: &crate::instance::TabScope,
        collector: Arc<EventCollector>,
        blocklist: Option<Blocklist>,
        redirect_scope: CancelScope,
    ) {
        let page = tab.page.clone();

        if let Err(e) = page.execute(network::EnableParams::default()).await {
            warn!("failed to enable network domain: {e}");
        }
        if let Err(e) = page.enable_runtime().await {
            warn!("failed to enable runtime domain: {e}");
        }

        match page.event_listener::<EventRequestWillBeSent>().await {
            Ok(mut events) => {
                let collector = collector.clone();
                let redirect_scope = redirect_scope.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        let (redirect_url, redirect_status) = match &event.redirect_response {
                            Some(r) => (Some(r.url.clone()), r.status as u16),
                            None => (None, 0),
                        };
                        collector
                            .on_request_will_be_sent(
                                event.request_id.inner().clone(),
                                event.request.url.clone(),
                                event.document_url.clone(),
                                event.request.method.clone(),
                                event.r#type.map(|t| format!("{t:?}")).unwrap_or_default(),
                                redirect_url,
                                redirect_status,
                            )
                            .await;
                        if collector.redirect_info().await.redirect_url.is_some() {
                            redirect_scope.cancel();
                        }
                    }
                });
            }
            Err(e) => warn!("failed to subscribe to requestWillBeSent: {e}"),
        }

        match page.event_listener::<EventResponseReceived>().await {
            Ok(mut events) => {
                let collector = collector.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        collector
                            .on_response_received(event.request_id.inner(), event.response.status as u16, 0)
                            .await;
                    }
                });
            }
            Err(e) => warn!("failed to subscribe to responseReceived: {e}"),
        }

        match page.event_listener::<EventLoadingFinished>().await {
            Ok(mut events) => {
                let collector = collector.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        collector
                            .on_loading_finished(event.request_id.inner(), event.encoded_data_length as i64)
                            .await;
                    }
                });
            }
            Err(e) => warn!("failed to subscribe to loadingFinished: {e}"),
        }

        match page.event_listener::<EventLoadingFailed>().await {
            Ok(mut events) => {
                let collector = collector.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        collector
                            .on_loading_failed(event.request_id.inner(), event.error_text.clone())
                            .await;
                    }
                });
            }
            Err(e) => warn!("failed to subscribe to loadingFailed: {e}"),
        }

        match page.event_listener::<EventDataReceived>().await {
            Ok(mut events) => {
                let collector = collector.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        collector
                            .on_data_received(event.request_id.inner(), event.data_length as u64)
                            .await;
                    }
                });
            }
            Err(e) => warn!("failed to subscribe to dataReceived: {e}"),
        }

        match page.event_listener::<EventConsoleApiCalled>().await {
            Ok(mut events) => {
                let collector = collector.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        let level = format!("{:?}", event.r#type);
                        let args = event
                            .args
                            .iter()
                            .map(|arg| {
                                arg.description.clone().unwrap_or_else(|| {
                                    arg.value.as_ref().map(|v| v.to_string()).unwrap_or_default()
                                })
                            })
                            .collect();
                        collector.on_console_api_called(level, args).await;
                    }
                });
            }
            Err(e) => warn!("failed to subscribe to consoleAPICalled: {e}"),
        }

        match page.event_listener::<EventExceptionThrown>().await {
            Ok(mut events) => {
                let collector = collector.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        let details = event.exception_details;
                        let stack_frames = details
                            .stack_trace
                            .as_ref()
                            .map(|st| {
                                st.call_frames
                                    .iter()
                                    .map(|f| format!("{} ({}:{}:{})", f.function_name, f.url, f.line_number, f.column_number))
                                    .collect()
                            })
                            .unwrap_or_default();
                        collector
                            .on_exception_thrown(
                                details.text.clone(),
                                details.url.clone().unwrap_or_default(),
                                details.line_number as i64,
                                details.column_number as i64,
                                stack_frames,
                            )
                            .await;
                    }
                });
            }
            Err(e) => warn!("failed to subscribe to exceptionThrown: {e}"),
        }

        match page.event_listener::<EventLifecycleEvent>().await {
            Ok(mut events) => {
                let collector = collector.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        collector
                            .on_lifecycle_event(event.frame_id.inner(), event.loader_id.inner(), event.name.clone())
                            .await;
                    }
                });
            }
            Err(e) => warn!("failed to subscribe to lifecycleEvent: {e}"),
        }

        let Some(blocklist) = blocklist.filter(|b| !b.is_empty()) else {
            return;
        };

        let enable_params = fetch::EnableParams::builder()
            .patterns(
                [fetch::RequestPattern::builder()
                    .url_pattern("*")
                    .request_stage(fetch::RequestStage::Request)
                    .build()]
                .into_iter(),
            )
            .build();
        if let Err(e) = page.execute(enable_params).await {
            warn!("failed to enable fetch domain: {e}");
            return;
        }

        match page.event_listener::<EventRequestPaused>().await {
            Ok(mut events) => {
                let collector = collector.clone();
                let page = page.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        let resource_type = event.resource_type.map(|t| format!("{t:?}")).unwrap_or_default();
                        let allowed = collector
                            .on_request_paused(&blocklist, event.request_id.inner(), &event.request.url, &resource_type)
                            .await;
                        if allowed {
                            if let Err(e) = page.execute(ContinueRequestParams::new(event.request_id.clone())).await {
                                warn!("failed to continue request: {e}");
                            }
                        } else {
                            match FailRequestParams::builder()
                                .request_id(event.request_id.clone())
                                .error_reason(network::ErrorReason::BlockedByClient)
                                .build()
                            {
                                Ok(params) => {
                                    if let Err(e) = page.execute(params).await {
                                        warn!("failed to fail blocked request: {e}");
                                    }
                                }
                                Err(e) => warn!("invalid fail-request params: {e}"),
                            }
                        }
                    }
                });
            }
            Err(e) => warn!("failed to subscribe to requestPaused: {e}"),
        }
    }

    async fn wait_for_event(collector: &Arc<EventCollector>, options: &RenderOptions) {
        let target = options.wait_event.cdp_event_name();
        loop {
            if collector.lifecycle_results().await.contains_key(target) {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    async fn extract_html_with_retries(tab: &crate::instance::TabScope) -> Result<String, String> {
        let mut last_err = String::new();
        for attempt in 0..3 {
            match tab.page.content().await {
                Ok(html) => return Ok(html),
                Err(e) => {
                    last_err = e.to_string();
                    if attempt < 2 {
                        sleep(Duration::from_millis(300)).await;
                    }
                }
            }
        }
        Err(last_err)
    }

    async fn current_location(tab: &crate::instance::TabScope) -> Option<String> {
        tab.page.url().await.ok().flatten()
    }

    async fn status_via_performance_api(tab: &crate::instance::TabScope) -> Option<u16> {
        let expr = "performance.getEntriesByType('navigation')[0]?.responseStatus ?? 0";
        let value = tab.page.evaluate(expr).await.ok()?;
        value.into_value::<u16>().ok()
    }

    async fn capture_screenshot(tab: &crate::instance::TabScope) -> Result<Vec<u8>, String> {
        tab.page
            .screenshot(chromiumoxide::page::ScreenshotParams::builder().build())
            .await
            .map_err(|e| e.to_string())
    }

    async fn build_partial(
        _tab: &crate::instance::TabScope,
        collector: &Arc<EventCollector>,
        start: Instant,
        redirect_url: Option<String>,
    ) -> RenderResult {
        RenderResult {
            html: String::new(),
            final_url: redirect_url.clone().unwrap_or_default(),
            redirect_url,
            status_code: 0,
            page_size_bytes: 0,
            render_time_seconds: start.elapsed().as_secs_f64(),
            network: collector.network_results().await,
            console: collector.console_results().await,
            error_console: collector.error_console().await,
            js_errors: collector.js_errors().await,
            lifecycle: Self::lifecycle_records(collector, start).await,
            screenshot: None,
        }
    }

    async fn lifecycle_records(collector: &Arc<EventCollector>, _start: Instant) -> Vec<LifecycleEventRecord> {
        collector
            .lifecycle_results()
            .await
            .into_iter()
            .map(|(event, duration)| LifecycleEventRecord {
                event,
                time_seconds: duration.as_secs_f64(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_scope_starts_uncancelled() {
        let scope = CancelScope::new();
        assert!(!scope.is_cancelled());
        scope.cancel();
        assert!(scope.is_cancelled());
    }
}
