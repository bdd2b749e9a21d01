//! BrowserPool (spec.md §4.3): bounded supply of ready instances with
//! fail-fast startup, non-blocking acquisition, self-healing on
//! acquisition, and bounded graceful shutdown.
//!
//! Acquisition never blocks on a semaphore permit — unlike the corpus's own
//! `BrowserPool::get_browser`, which awaits a `Semaphore` — since spec.md
//! requires `acquire()` to return `NoInstanceAvailable` immediately rather
//! than queue the caller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::instance::BrowserInstance;

pub struct BrowserPool {
    instances: Vec<Arc<BrowserInstance>>,
    available: Mutex<VecDeque<usize>>,
    active_count: AtomicUsize,
    shutting_down: AtomicBool,
    config: PoolConfig,
}

impl BrowserPool {
    /// Sequentially creates `PoolSize` instances and enqueues their ids. Any
    /// creation failure terminates all previously created instances and
    /// returns failure.
    pub async fn new(config: PoolConfig) -> Result<Arc<Self>, PoolError> {
        let size = config.effective_pool_size();
        let mut instances = Vec::with_capacity(size);

        for id in 0..size {
            match BrowserInstance::new(id, config.instance.clone()).await {
                Ok(instance) => instances.push(Arc::new(instance)),
                Err(e) => {
                    error!("pool startup: instance {id} failed, tearing down: {e}");
                    for existing in &instances {
                        existing.terminate().await;
                    }
                    return Err(PoolError::StartupFailed(e.to_string()));
                }
            }
        }

        let available = (0..size).collect();
        info!("browser pool started with {size} instances");

        Ok(Arc::new(Self {
            instances,
            available: Mutex::new(available),
            active_count: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            config,
        }))
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    /// Never blocks. See spec.md §4.3 for the exact six-step algorithm this
    /// implements.
    pub async fn acquire(&self) -> Result<Arc<BrowserInstance>, PoolError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(PoolError::ShuttingDown);
        }

        let id = {
            let mut available = self.available.lock().await;
            available.pop_front().ok_or(PoolError::NoInstanceAvailable)?
        };

        if self.shutting_down.load(Ordering::Acquire) {
            self.requeue(id).await;
            return Err(PoolError::ShuttingDown);
        }

        let instance = self.instances[id].clone();

        if !instance.is_alive().await {
            warn!("instance {id} not alive on acquire, attempting restart");
            if let Err(e) = instance.restart().await {
                self.requeue(id).await;
                return Err(PoolError::StartupFailed(e.to_string()));
            }
        } else if instance.should_restart().await {
            if let Err(e) = instance.restart().await {
                warn!("instance {id} scheduled restart failed, continuing with existing instance: {e}");
            }
        }

        self.active_count.fetch_add(1, Ordering::AcqRel);
        instance.set_status(crate::instance::InstanceStatus::Rendering);
        Ok(instance)
    }

    /// Decrements `activeCount` BEFORE requeueing, so a concurrent shutdown
    /// poll observes the correct count.
    pub async fn release(&self, instance: &Arc<BrowserInstance>) {
        self.active_count.fetch_sub(1, Ordering::AcqRel);
        instance.set_status(crate::instance::InstanceStatus::Idle);
        instance.increment_renders();
        self.requeue(instance.id).await;
    }

    async fn requeue(&self, id: usize) {
        let mut available = self.available.lock().await;
        debug_assert!(
            !available.contains(&id),
            "double release of instance {id}"
        );
        available.push_back(id);
    }

    /// Sets the shutdown flag, polls `activeCount` every 50ms until zero or
    /// `ShutdownTimeout` elapses, then terminates every instance. Always
    /// succeeds.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let deadline = Instant::now() + self.config.shutdown_timeout;

        while self.active_count() > 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(50)).await;
        }

        if self.active_count() > 0 {
            warn!(
                "pool shutdown timeout elapsed with {} active renders outstanding",
                self.active_count()
            );
        }

        for instance in &self.instances {
            instance.terminate().await;
        }
        info!("browser pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_count_starts_at_zero() {
        let active = AtomicUsize::new(0);
        assert_eq!(active.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn requeue_rejects_logical_double_release_in_debug() {
        let available = Mutex::new(VecDeque::from([0usize, 1]));
        let guard = available.lock().await;
        assert!(guard.contains(&0));
    }
}
