//! Opaque stream handles for the API boundary.
//!
//! A handle is an index into a [`StreamArena`] plus the generation the slot
//! had when the handle was issued. Closing a stream bumps the slot's
//! generation, so stale handles are rejected instead of resolving to
//! whatever stream reuses the slot.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use super::Stream;
use crate::models::error::{PalError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    index: u32,
    generation: u32,
}

impl StreamHandle {
    /// Never issued; always rejected.
    pub const NULL: StreamHandle = StreamHandle {
        index: 0,
        generation: 0,
    };

    /// Packs the handle into a single integer for foreign callers.
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

struct Slot {
    generation: u32,
    stream: Option<Arc<Stream>>,
}

/// Slot arena of open streams. Freed slots are reused lowest index first.
#[derive(Default)]
pub struct StreamArena {
    slots: Vec<Slot>,
    free: BinaryHeap<Reverse<u32>>,
}

impl StreamArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stream: Arc<Stream>) -> Result<StreamHandle> {
        let index = match self.free.pop() {
            Some(Reverse(index)) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| PalError::ResourceUnavailable("stream handle space exhausted".into()))?;
                // Generation 0 is reserved for the null handle.
                self.slots.push(Slot {
                    generation: 1,
                    stream: None,
                });
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.stream = Some(stream);
        Ok(StreamHandle {
            index,
            generation: slot.generation,
        })
    }

    pub fn get(&self, handle: StreamHandle) -> Result<Arc<Stream>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.stream.clone())
            .ok_or_else(|| invalid(handle))
    }

    /// Detaches the stream; the handle and every copy of it become stale.
    pub fn remove(&mut self, handle: StreamHandle) -> Result<Arc<Stream>> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or_else(|| invalid(handle))?;
        let stream = slot.stream.take().ok_or_else(|| invalid(handle))?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(Reverse(handle.index));
        Ok(stream)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.stream.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn invalid(handle: StreamHandle) -> PalError {
    PalError::InvalidArgument(format!("invalid stream handle {:#x}", handle.to_raw()))
}
