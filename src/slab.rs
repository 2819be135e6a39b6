//! Fixed-capacity handle table for live pipelines
//!
//! Handles are never reused, slots are. Each slot has its own mutex, so a
//! long training call on one pipeline does not block the others; only
//! create and destroy take the table-wide write lock.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

struct Handles {
    free: Vec<usize>,
    next_id: u64,
    slot_of: HashMap<u64, usize>,
}

pub struct PipelineSlab<T> {
    slots: Vec<Mutex<Option<(u64, T)>>>,
    handles: RwLock<Handles>,
}

impl<T> PipelineSlab<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Mutex::new(None)).collect(),
            handles: RwLock::new(Handles {
                free: (0..capacity).rev().collect(),
                next_id: 0,
                slot_of: HashMap::new(),
            }),
        }
    }

    /// Store `item` and return its handle, or `None` when full
    pub fn insert(&self, item: T) -> Option<u64> {
        let mut handles = self.handles.write().ok()?;
        let slot = handles.free.pop()?;
        let id = handles.next_id;
        *self.slots[slot].lock().ok()? = Some((id, item));

        handles.next_id += 1;
        handles.slot_of.insert(id, slot);
        Some(id)
    }

    fn slot(&self, id: u64) -> Option<usize> {
        self.handles.read().ok()?.slot_of.get(&id).copied()
    }

    /// Run `f` on the item behind `id`, locking only its slot
    pub fn with_mut<F, R>(&self, id: u64, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let slot = self.slot(id)?;
        self.with_slot_mut(slot, id, f)
    }

    /// The slot may have been freed and refilled since `id` was looked up
    fn with_slot_mut<F, R>(&self, slot: usize, id: u64, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.slots.get(slot)?.lock().ok()?;
        match guard.as_mut() {
            Some((owner, item)) if *owner == id => Some(f(item)),
            _ => None,
        }
    }

    pub fn remove(&self, id: u64) -> Option<T> {
        let mut handles = self.handles.write().ok()?;
        let slot = handles.slot_of.remove(&id)?;
        let mut guard = self.slots[slot].lock().ok()?;
        let item = match guard.take() {
            Some((owner, item)) if owner == id => item,
            other => {
                *guard = other;
                return None;
            }
        };
        drop(guard);
        handles.free.push(slot);
        Some(item)
    }

    pub fn count(&self) -> usize {
        self.handles.read().map(|h| h.slot_of.len()).unwrap_or(0)
    }
}
