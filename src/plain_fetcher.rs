//! PlainFetcher (spec.md §4.8, external contract): performs an HTTP GET with
//! configurable user-agent/accept headers, optional redirect following
//! (max 10 hops), and a caller timeout. Refuses to dial addresses `NetGuard`
//! identifies as private/reserved.
//!
//! Given enough algorithmic detail in spec.md to ship concretely; grounded
//! on the corpus's own `reqwest`-based fetch helpers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::dns::{Name, Resolve, Resolving};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::redirect::Policy;

use crate::error::CoreError;
use crate::net_guard::NetGuard;

const MAX_REDIRECTS: usize = 10;

/// Custom `reqwest` DNS resolver so every dialed address, not just the
/// initial URL, clears `NetGuard::validate_dial_addr` — a redirect hop can
/// point at a private address the initial-URL check never saw.
struct NetGuardResolver {
    net_guard: Arc<dyn NetGuard>,
}

impl Resolve for NetGuardResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let net_guard = self.net_guard.clone();
        Box::pin(async move {
            let host = name.as_str().to_string();
            let resolved = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?;

            let allowed: Vec<SocketAddr> = resolved
                .filter(|addr| net_guard.validate_dial_addr(addr).is_ok())
                .collect();
            if allowed.is_empty() {
                return Err("no resolved address passed the net guard".into());
            }
            Ok(Box::new(allowed.into_iter()) as Box<dyn Iterator<Item = SocketAddr> + Send>)
        })
    }
}

#[derive(Debug, Clone)]
pub struct PlainFetchResult {
    pub body: String,
    pub final_url: String,
    pub redirect_target: Option<String>,
    pub status_code: u16,
    pub body_size_bytes: u64,
    pub elapsed_seconds: f64,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    pub accept: String,
    pub follow_redirects: bool,
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; RenderCompareBot/1.0)".to_string(),
            accept: "text/html,application/xhtml+xml".to_string(),
            follow_redirects: true,
            timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
pub trait PlainFetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PlainFetchResult, CoreError>;
}

pub struct ReqwestPlainFetcher {
    net_guard: Arc<dyn NetGuard>,
}

impl ReqwestPlainFetcher {
    pub fn new(net_guard: Arc<dyn NetGuard>) -> Self {
        Self { net_guard }
    }
}

#[async_trait]
impl PlainFetcher for ReqwestPlainFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PlainFetchResult, CoreError> {
        self.net_guard
            .validate_url(url)
            .await
            .map_err(CoreError::NetGuard)?;

        let redirect_policy = if options.follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent).map_err(|e| CoreError::Fetch(e.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&options.accept).map_err(|e| CoreError::Fetch(e.to_string()))?,
        );

        let client = reqwest::Client::builder()
            .redirect(redirect_policy)
            .default_headers(headers)
            .timeout(options.timeout)
            .dns_resolver(Arc::new(NetGuardResolver {
                net_guard: self.net_guard.clone(),
            }))
            .build()
            .map_err(|e| CoreError::Fetch(e.to_string()))?;

        let start = Instant::now();
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::Fetch(e.to_string()))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let redirect_target = if !options.follow_redirects && response.status().is_redirection() {
            response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        } else {
            None
        };

        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect();

        let body = response.text().await.map_err(|e| CoreError::Fetch(e.to_string()))?;
        let body_size_bytes = body.len() as u64;
        let elapsed_seconds = start.elapsed().as_secs_f64();

        Ok(PlainFetchResult {
            body,
            final_url,
            redirect_target,
            status_code,
            body_size_bytes,
            elapsed_seconds,
            headers: response_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_follow_redirects_with_ten_hop_cap() {
        let opts = FetchOptions::default();
        assert!(opts.follow_redirects);
        assert_eq!(MAX_REDIRECTS, 10);
    }
}
