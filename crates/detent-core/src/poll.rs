//! Background sampling of switch lines that cannot raise interrupts
//!
//! Used when expander lines are read through plain GPIO reads (no bank
//! interrupt wiring). The thread wakes every interval, samples each enabled
//! expander switch through the router and goes back to sleep.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::router::InputRouter;

/// Default sampling period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll thread handle
///
/// Owns the join handle and a shutdown flag. Dropping it stops the thread
/// and waits for it.
pub struct SwitchPoller {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    /// Completed sampling passes
    passes: Arc<AtomicU64>,
}

impl SwitchPoller {
    pub fn spawn(router: Arc<InputRouter>, interval: Duration) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let passes = Arc::new(AtomicU64::new(0));
        let passes_clone = passes.clone();

        let handle = thread::Builder::new()
            .name("detent-switch-poll".to_string())
            .spawn(move || Self::poll_loop(&router, interval, &shutdown_clone, &passes_clone))?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
            passes,
        })
    }

    fn poll_loop(
        router: &InputRouter,
        interval: Duration,
        shutdown: &AtomicBool,
        passes: &AtomicU64,
    ) {
        log::info!("SwitchPoller: started ({} ms)", interval.as_millis());
        while !shutdown.load(Ordering::Relaxed) {
            let changed = router.poll_expander_switches();
            if changed > 0 {
                log::trace!("SwitchPoller: {} switch(es) changed", changed);
            }
            passes.fetch_add(1, Ordering::Relaxed);
            thread::sleep(interval);
        }
        log::info!("SwitchPoller: stopped");
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SwitchPoller {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            log::debug!("SwitchPoller: waiting for thread to stop...");
            let _ = handle.join();
        }
    }
}
