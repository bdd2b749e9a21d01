//! Configuration types recognized by the pool, instances, and render
//! orchestrator. Loading these from a file, environment, or CLI flags is the
//! responsibility of the embedding application; this module only defines the
//! recognized shape and its defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options honored when (re)starting a single browser instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Start the browser without a visible UI.
    pub headless: bool,
    /// Pass the platform-specific "no sandbox" flag.
    pub no_sandbox: bool,
    /// Optional URL navigated to after each (re)start to pre-warm caches.
    pub warmup_url: Option<String>,
    /// Per-warmup ceiling.
    pub warmup_timeout: Duration,
    /// Max renders before recycle. 0 disables count-based recycling.
    pub restart_after_count: u64,
    /// Max age before recycle. Zero disables age-based recycling.
    pub restart_after_time: Duration,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            headless: true,
            no_sandbox: false,
            warmup_url: None,
            warmup_timeout: Duration::from_secs(10),
            restart_after_count: 0,
            restart_after_time: Duration::ZERO,
        }
    }
}

/// Options for the pool itself, layered on top of `InstanceConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of instances to pre-create. Values `<= 0` are treated as 1.
    pub pool_size: usize,
    /// Grace period for active renders to finish at shutdown.
    pub shutdown_timeout: Duration,
    pub instance: InstanceConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            shutdown_timeout: Duration::from_secs(10),
            instance: InstanceConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.max(1)
    }
}

/// The lifecycle event an orchestrated render waits for before proceeding
/// past the soft timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitEvent {
    DomContentLoaded,
    Load,
    NetworkIdle,
    NetworkAlmostIdle,
}

impl Default for WaitEvent {
    fn default() -> Self {
        WaitEvent::Load
    }
}

impl WaitEvent {
    /// The CDP `Page.lifecycleEvent` name this wait event corresponds to.
    pub fn cdp_event_name(&self) -> &'static str {
        match self {
            WaitEvent::DomContentLoaded => "DOMContentLoaded",
            WaitEvent::Load => "load",
            WaitEvent::NetworkIdle => "networkIdle",
            WaitEvent::NetworkAlmostIdle => "networkAlmostIdle",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const DESKTOP: Viewport = Viewport {
        width: 1920,
        height: 1080,
    };
    pub const MOBILE: Viewport = Viewport {
        width: 414,
        height: 896,
    };
}

/// Recognized options for one render (spec.md §3 `RenderOptions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOptions {
    pub url: String,
    pub user_agent: Option<String>,
    pub soft_timeout: Duration,
    pub wait_event: WaitEvent,
    #[serde(skip)]
    pub blocklist: Option<crate::blocklist::Blocklist>,
    pub is_mobile: bool,
    pub capture_screenshot: bool,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
}

impl RenderOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: None,
            soft_timeout: Duration::from_secs(10),
            wait_event: WaitEvent::default(),
            blocklist: None,
            is_mobile: false,
            capture_screenshot: false,
            viewport_width: None,
            viewport_height: None,
        }
    }

    /// The effective viewport: explicit overrides win, otherwise the mobile
    /// or desktop default depending on `is_mobile`.
    pub fn effective_viewport(&self) -> Viewport {
        let default = if self.is_mobile {
            Viewport::MOBILE
        } else {
            Viewport::DESKTOP
        };
        Viewport {
            width: self.viewport_width.unwrap_or(default.width),
            height: self.viewport_height.unwrap_or(default.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_pool_size_floors_at_one() {
        let mut cfg = PoolConfig::default();
        cfg.pool_size = 0;
        assert_eq!(cfg.effective_pool_size(), 1);
    }

    #[test]
    fn effective_viewport_uses_mobile_default() {
        let mut opts = RenderOptions::new("https://example.com");
        opts.is_mobile = true;
        let vp = opts.effective_viewport();
        assert_eq!(vp.width, Viewport::MOBILE.width);
    }

    #[test]
    fn effective_viewport_explicit_override_wins() {
        let mut opts = RenderOptions::new("https://example.com");
        opts.viewport_width = Some(800);
        opts.viewport_height = Some(600);
        let vp = opts.effective_viewport();
        assert_eq!((vp.width, vp.height), (800, 600));
    }
}
