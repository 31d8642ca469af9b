//! Logical clocks
//!
//! The graph runs on a master clock. An operator that pulls its input
//! out-of-band owns a slave clock registered under the master: ending a
//! slave tick never advances the master, so feeding the process does not
//! stall the graph tick.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A tick source, optionally subordinated to a master
pub struct Clock {
    name: String,
    ticks: AtomicU64,
    master: Option<Weak<Clock>>,
    subclocks: Mutex<Vec<Arc<Clock>>>,
}

impl Clock {
    /// Create a top-level clock
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            ticks: AtomicU64::new(0),
            master: None,
            subclocks: Mutex::new(Vec::new()),
        })
    }

    /// Create a clock ticking independently but registered under this one
    pub fn register_subclock(self: &Arc<Self>, name: impl Into<String>) -> Arc<Clock> {
        let sub = Arc::new(Clock {
            name: name.into(),
            ticks: AtomicU64::new(0),
            master: Some(Arc::downgrade(self)),
            subclocks: Mutex::new(Vec::new()),
        });
        self.subclocks.lock().push(sub.clone());
        tracing::debug!(master = %self.name, slave = %sub.name, "Registered subclock");
        sub
    }

    /// Drop the registration of `sub`. Returns false if it was not registered.
    pub fn forget_subclock(&self, sub: &Arc<Clock>) -> bool {
        let mut subclocks = self.subclocks.lock();
        let before = subclocks.len();
        subclocks.retain(|c| !Arc::ptr_eq(c, sub));
        let removed = subclocks.len() != before;
        if removed {
            tracing::debug!(master = %self.name, slave = %sub.name, "Forgot subclock");
        }
        removed
    }

    /// End the current tick, returning the new tick count
    pub fn end_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Ticks ended so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The master this clock is registered under, if still alive
    pub fn master(&self) -> Option<Arc<Clock>> {
        self.master.as_ref().and_then(Weak::upgrade)
    }

    pub fn subclock_count(&self) -> usize {
        self.subclocks.lock().len()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("name", &self.name)
            .field("ticks", &self.ticks())
            .field("subclocks", &self.subclock_count())
            .finish()
    }
}
