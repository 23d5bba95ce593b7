use std::collections::BTreeMap;

use crate::models::stream_attributes::StreamClass;

/// Number of active streams per (type, direction) class.
///
/// Only the resource manager mutates this, from start/stop notifications.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyState {
    counts: BTreeMap<StreamClass, u32>,
}

impl ConcurrencyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one activation or deactivation. Returns `false` when a
    /// deactivation arrived for a class with no active streams; the count is
    /// left at zero in that case.
    pub fn update(&mut self, class: StreamClass, active: bool) -> bool {
        if active {
            *self.counts.entry(class).or_insert(0) += 1;
            return true;
        }
        match self.counts.get_mut(&class) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&class);
                }
                true
            }
            _ => false,
        }
    }

    pub fn count(&self, class: StreamClass) -> u32 {
        self.counts.get(&class).copied().unwrap_or(0)
    }

    pub fn is_active(&self, class: StreamClass) -> bool {
        self.count(class) > 0
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Snapshot of every class with at least one active stream.
    pub fn snapshot(&self) -> BTreeMap<StreamClass, u32> {
        self.counts.clone()
    }
}
