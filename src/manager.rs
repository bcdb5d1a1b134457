//! Browser pool with hot-swap crash recovery
//!
//! Owns every live browser instance of the process. Exactly one instance is
//! active and hands out new page contexts. When content retrieval fails in a way
//! that suggests the process died, the pool launches a replacement, makes it
//! active immediately and retires the old instance after a grace delay so the
//! page contexts still running on it can finish.
//!
//! # Locking
//!
//! - The handle list sits behind a `parking_lot::RwLock` that is never held
//!   across `.await`; `current()` is a short read.
//! - Swaps are serialized by a `tokio::sync::Mutex` held across the launch of
//!   the replacement, so concurrent failure reports on one browser produce a
//!   single replacement.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::PoolConfig;
use crate::browser::{BrowserEngine, BrowserInstance, BrowserResult, PageSession};
use crate::utils::{ScrapeError, ScrapeResult};

/// Cheap, clonable reference to one pooled browser instance
#[derive(Clone)]
pub struct BrowserHandle {
    id: u64,
    instance: Arc<dyn BrowserInstance>,
}

impl BrowserHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Open a new page context on this browser
    pub async fn new_page(&self) -> BrowserResult<Arc<dyn PageSession>> {
        self.instance.new_page().await
    }
}

impl fmt::Debug for BrowserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserHandle").field("id", &self.id).finish()
    }
}

/// Lifecycle of a pooled browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Serves new page contexts
    Active,
    /// Still open for in-flight pages, counting down to close
    Retiring,
    /// Closed, or never part of this pool
    Closed,
}

struct PoolEntry {
    handle: BrowserHandle,
    state: HandleState,
}

/// Process-wide owner of live browser instances
///
/// Entries are kept in insertion order; the most recently inserted active
/// entry is the one handed out by [`BrowserPool::current`].
pub struct BrowserPool {
    engine: Arc<dyn BrowserEngine>,
    config: PoolConfig,
    entries: Arc<RwLock<Vec<PoolEntry>>>,
    swap_lock: Mutex<()>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    fatal: CancellationToken,
}

impl BrowserPool {
    /// Create an empty pool. Nothing is launched until [`BrowserPool::launch_initial`].
    pub fn new(engine: Arc<dyn BrowserEngine>, config: PoolConfig) -> Self {
        Self {
            engine,
            config,
            entries: Arc::new(RwLock::new(Vec::new())),
            swap_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            fatal: CancellationToken::new(),
        }
    }

    /// Create a pool and launch its first browser
    ///
    /// # Errors
    /// Returns `ScrapeError::Launch` if the first browser cannot be started.
    pub async fn start(engine: Arc<dyn BrowserEngine>, config: PoolConfig) -> ScrapeResult<Arc<Self>> {
        let pool = Arc::new(Self::new(engine, config));
        pool.launch_initial().await?;
        Ok(pool)
    }

    /// Launch the first browser and make it active
    pub async fn launch_initial(&self) -> ScrapeResult<BrowserHandle> {
        let _swap = self.swap_lock.lock().await;

        if let Some(existing) = self.find_active() {
            return Ok(existing);
        }

        let handle = self.launch().await?;
        self.entries.write().push(PoolEntry {
            handle: handle.clone(),
            state: HandleState::Active,
        });
        info!(browser_id = handle.id, "Browser pool started");
        Ok(handle)
    }

    /// The active browser
    ///
    /// # Errors
    /// `ScrapeError::PoolExhausted` if no browser was ever launched (or the pool
    /// has been shut down).
    pub fn current(&self) -> ScrapeResult<BrowserHandle> {
        self.find_active().ok_or(ScrapeError::PoolExhausted)
    }

    /// Report that content retrieval on `handle` failed fatally
    ///
    /// If `handle` is still active, a replacement is launched and made active
    /// before this returns; the old browser is closed after the retirement grace
    /// delay. Reports about browsers that are no longer active are ignored.
    ///
    /// # Errors
    /// `ScrapeError::Launch` if the replacement cannot be started. The pool's
    /// fatal signal is raised as well, since the server can no longer recover.
    pub async fn report_fatal(&self, handle: &BrowserHandle) -> ScrapeResult<()> {
        let _swap = self.swap_lock.lock().await;

        if self.shutdown.is_cancelled() {
            debug!(browser_id = handle.id, "Pool shutting down, ignoring fatal report");
            return Ok(());
        }

        if self.state_of(handle) != HandleState::Active {
            debug!(
                browser_id = handle.id,
                "Fatal report for a browser that is no longer active, ignoring"
            );
            return Ok(());
        }

        warn!(
            browser_id = handle.id,
            "Browser reported fatal, launching replacement"
        );
        let replacement = match self.launch().await {
            Ok(replacement) => replacement,
            Err(e) => {
                error!(browser_id = handle.id, "Failed to launch replacement browser: {}", e);
                self.fatal.cancel();
                return Err(e);
            }
        };

        {
            let mut entries = self.entries.write();
            if let Some(entry) = entries.iter_mut().find(|e| e.handle.id == handle.id) {
                entry.state = HandleState::Retiring;
            }
            entries.push(PoolEntry {
                handle: replacement.clone(),
                state: HandleState::Active,
            });
        }
        info!(
            retired = handle.id,
            active = replacement.id,
            grace_ms = self.config.retire_grace_ms,
            "Swapped active browser"
        );

        self.schedule_retirement(handle.clone());
        Ok(())
    }

    /// Close every browser immediately and cancel pending retirements
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let _swap = self.swap_lock.lock().await;

        let drained: Vec<PoolEntry> = self.entries.write().drain(..).collect();
        for entry in drained {
            info!(browser_id = entry.handle.id, state = ?entry.state, "Shutting down browser");
            if let Err(e) = entry.handle.instance.close().await {
                warn!(browser_id = entry.handle.id, "Failed to close browser: {}", e);
            }
        }
    }

    /// Lifecycle state of `handle` within this pool
    pub fn state_of(&self, handle: &BrowserHandle) -> HandleState {
        self.entries
            .read()
            .iter()
            .find(|e| e.handle.id == handle.id)
            .map_or(HandleState::Closed, |e| e.state)
    }

    /// Number of browsers not yet closed
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.state == HandleState::Active)
            .count()
    }

    /// Cancelled when the pool can no longer supply a working browser
    pub fn fatal_signal(&self) -> CancellationToken {
        self.fatal.clone()
    }

    fn find_active(&self) -> Option<BrowserHandle> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|e| e.state == HandleState::Active)
            .map(|e| e.handle.clone())
    }

    async fn launch(&self) -> ScrapeResult<BrowserHandle> {
        let instance = self.engine.launch().await.map_err(ScrapeError::Launch)?;
        Ok(BrowserHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            instance,
        })
    }

    fn schedule_retirement(&self, handle: BrowserHandle) {
        let entries = self.entries.clone();
        let shutdown = self.shutdown.clone();
        let grace = self.config.retire_grace();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace) => {}
                // shutdown() closes everything itself
                _ = shutdown.cancelled() => return,
            }

            let removed = {
                let mut entries = entries.write();
                entries
                    .iter()
                    .position(|e| e.handle.id == handle.id && e.state == HandleState::Retiring)
                    .map(|idx| entries.remove(idx))
            };

            if let Some(entry) = removed {
                info!(browser_id = entry.handle.id, "Closing retired browser");
                if let Err(e) = entry.handle.instance.close().await {
                    warn!(browser_id = entry.handle.id, "Failed to close retired browser: {}", e);
                }
            }
        });
    }
}

impl Drop for BrowserPool {
    fn drop(&mut self) {
        // Not a clean shutdown; call shutdown().await before dropping
        debug!("BrowserPool dropping");
        self.shutdown.cancel();
    }
}
