use std::sync::atomic::{AtomicI64, Ordering};

use crate::model::Ms;

/// Source of the current instant. Every time-gated decision reads it through here.
pub trait Clock: Send + Sync {
    fn now(&self) -> Ms;
}

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Ms {
        now_ms()
    }
}

/// A clock that only moves when told to. Used to drive the time windows in tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(at: Ms) -> Self {
        Self {
            now: AtomicI64::new(at),
        }
    }

    pub fn set(&self, at: Ms) {
        self.now.store(at, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Ms) -> Ms {
        self.now.fetch_add(by, Ordering::SeqCst) + by
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Ms {
        self.now.load(Ordering::SeqCst)
    }
}
