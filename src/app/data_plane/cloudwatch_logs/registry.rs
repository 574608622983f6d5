//! Current stream set holder
//!
//! ```text
//! [renewal task] → StreamSet::new(..) → [ArcSwapOption::store] ─┐
//!                                                               ↓
//! [fetch task]   ← Arc<StreamSet> ← [ArcSwapOption::load_full] ─┘
//! ```
//!
//! A new set is fully built before it is swapped in, so a fetch cycle
//! always works on one complete set, old or new.

#![warn(clippy::all, rust_2018_idioms)]

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::types::StreamSet;

/// Holds the stream set the fetcher targets
#[derive(Debug, Default)]
pub struct StreamRegistry {
    current: ArcSwapOption<StreamSet>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the most recent set, `None` until the first discovery
    pub fn current(&self) -> Option<Arc<StreamSet>> {
        self.current.load_full()
    }

    /// Swap in a new set
    pub fn replace(&self, streams: StreamSet) {
        trace_debug!(
            "Replacing stream set for {} ({} streams)",
            streams.log_group(),
            streams.len()
        );
        self.current.store(Some(Arc::new(streams)));
    }
}
