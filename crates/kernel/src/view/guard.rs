//! Re-entrancy and loading-state guards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use crate::error::ViewError;

/// Default ceiling after which a loading flag is cleared regardless.
pub const DEFAULT_LOADING_CEILING: Duration = Duration::from_secs(10);

/// Allows one operation at a time.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or fail with [`ViewError::Busy`] if it is taken.
    pub fn try_begin(&self) -> Result<InFlightGuard, ViewError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ViewError::Busy)?;
        Ok(InFlightGuard {
            busy: self.busy.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the [`InFlight`] slot on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Observable loading flag with a safety ceiling.
///
/// The flag is set by [`start`](Self::start) and cleared when the returned
/// guard drops or when the ceiling elapses, whichever comes first.
#[derive(Debug, Clone)]
pub struct LoadingState {
    flag: Arc<watch::Sender<bool>>,
    generation: Arc<AtomicU64>,
    ceiling: Duration,
}

impl LoadingState {
    pub fn new(ceiling: Duration) -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
            generation: Arc::new(AtomicU64::new(0)),
            ceiling,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.flag.borrow()
    }

    /// Set the flag and arm the safety timer. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> LoadingGuard {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.flag.send_replace(true);

        let flag = self.flag.clone();
        let current = self.generation.clone();
        let ceiling = self.ceiling;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            if current.load(Ordering::Acquire) == generation && *flag.borrow() {
                warn!(
                    ceiling_ms = ceiling.as_millis() as u64,
                    "operation still loading at ceiling; clearing loading state"
                );
                flag.send_replace(false);
            }
        });

        LoadingGuard {
            flag: self.flag.clone(),
            current: self.generation.clone(),
            generation,
            timer,
        }
    }
}

impl Default for LoadingState {
    fn default() -> Self {
        Self::new(DEFAULT_LOADING_CEILING)
    }
}

/// Clears the loading flag for its own generation on drop.
#[derive(Debug)]
pub struct LoadingGuard {
    flag: Arc<watch::Sender<bool>>,
    current: Arc<AtomicU64>,
    generation: u64,
    timer: tokio::task::JoinHandle<()>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.timer.abort();
        if self.current.load(Ordering::Acquire) == self.generation {
            self.flag.send_replace(false);
        }
    }
}
