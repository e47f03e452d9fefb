//! Cooperative cancellation.
//!
//! A [`StopSignal`] is owned by whoever schedules the work; generation code
//! receives a [`StopToken`] by value and polls it before every raster
//! allocation and every recursive sub-graph call.

use std::sync::atomic::{AtomicBool, Ordering};

/// Owner side of a cancellation flag.
#[derive(Debug, Default)]
pub struct StopSignal {
    flag: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that any pass holding a token from this signal return early.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Re-arms the signal for a fresh pass.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn token(&self) -> StopToken<'_> {
        StopToken {
            flag: Some(&self.flag),
        }
    }
}

/// Cheap, copyable view of a [`StopSignal`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StopToken<'a> {
    flag: Option<&'a AtomicBool>,
}

impl StopToken<'_> {
    /// A token that is never signalled.
    pub const fn never() -> Self {
        StopToken { flag: None }
    }

    #[inline]
    pub fn stopped(self) -> bool {
        self.flag.is_some_and(|f| f.load(Ordering::Relaxed))
    }
}
