//! Arena of live execution units.
//!
//! Slots are addressed by [`UnitId`]; freed slots go onto a free list and
//! come back with a bumped generation. The registry itself does no locking:
//! [`crate::runtime::Runtime`] only hands it out inside a critical section.

use super::{UnitId, UnitName, UnitParams, UnitReport};
use crate::backend::NativeHandle;
use crate::config::MAX_UNITS;
use crate::errors::SpawnError;
use alloc::vec::Vec;

#[derive(Debug)]
struct Entry<N> {
    name: UnitName,
    priority: u8,
    stack_size: usize,
    native: Option<N>,
    unused_stack: Option<usize>,
    reclaimable: bool,
}

#[derive(Debug)]
struct Slot<N> {
    generation: u32,
    entry: Option<Entry<N>>,
}

/// Registry of execution units.
#[derive(Debug)]
pub struct Registry<N: NativeHandle> {
    slots: Vec<Slot<N>>,
    free: Vec<u32>,
    len: usize,
}

impl<N: NativeHandle> Registry<N> {
    /// An empty registry.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Add an entry for a unit that is about to be created.
    ///
    /// `unused_stack` is the initial unused-stack figure, `None` when the
    /// backend cannot measure it.
    pub fn register(&mut self, params: &UnitParams, unused_stack: Option<usize>) -> Result<UnitId, SpawnError> {
        let entry = Entry {
            name: params.name.clone(),
            priority: params.priority,
            stack_size: params.stack_size,
            native: None,
            unused_stack,
            reclaimable: false,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            self.len += 1;
            return Ok(UnitId::new(index, slot.generation));
        }

        if self.slots.len() >= MAX_UNITS {
            return Err(SpawnError::RegistryFull);
        }
        let index = self.slots.len() as u32;
        // Room for every slot on the free list, so release never allocates.
        self.free.reserve(self.slots.len() + 1 - self.free.len());
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        self.len += 1;
        Ok(UnitId::new(index, 0))
    }

    fn entry_mut(&mut self, id: UnitId) -> Option<&mut Entry<N>> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Attach the native handle once the backend has created the unit.
    ///
    /// Returns `false` if the entry is already gone.
    pub fn bind_native(&mut self, id: UnitId, native: N) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.native = Some(native);
                true
            }
            None => false,
        }
    }

    /// Flag a unit whose entry function has returned.
    ///
    /// The native handle is dropped with it: the task behind it may already
    /// be gone.
    pub fn mark_reclaimable(&mut self, id: UnitId) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.reclaimable = true;
                entry.native = None;
                true
            }
            None => false,
        }
    }

    /// Drop an entry immediately, reclaimable or not.
    pub fn remove(&mut self, id: UnitId) -> bool {
        if self.entry_mut(id).is_none() {
            return false;
        }
        self.release(id.index());
        true
    }

    fn release(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index as u32);
        self.len -= 1;
    }

    /// Remove every reclaimable entry; returns how many went.
    ///
    /// Runs on the idle path inside a critical section and allocates nothing.
    pub fn sweep(&mut self) -> usize {
        let mut reclaimed = 0;
        for index in 0..self.slots.len() {
            if self.slots[index].entry.as_ref().is_some_and(|e| e.reclaimable) {
                self.release(index);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Number of slots, occupied or free. Indices below this may be passed
    /// to [`Registry::update_unused`].
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Refresh the unused-stack figure of the entry at `index`.
    ///
    /// `measure` is only called for live entries with a native handle.
    /// Returns `true` if the entry was updated.
    pub fn update_unused<F>(&mut self, index: usize, measure: F) -> bool
    where
        F: FnOnce(N) -> Option<usize>,
    {
        let entry = match self.slots.get_mut(index).and_then(|slot| slot.entry.as_mut()) {
            Some(entry) if !entry.reclaimable => entry,
            _ => return false,
        };
        match entry.native {
            Some(native) => {
                entry.unused_stack = measure(native);
                true
            }
            None => false,
        }
    }

    /// Whether a not-yet-exited unit carries `name`.
    pub fn contains_live_name(&self, name: &str) -> bool {
        self.entries().any(|(_, e)| !e.reclaimable && e.name.as_str() == name)
    }

    fn entries(&self) -> impl Iterator<Item = (UnitId, &Entry<N>)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry
                .as_ref()
                .map(|entry| (UnitId::new(index as u32, slot.generation), entry))
        })
    }

    fn report(id: UnitId, entry: &Entry<N>) -> UnitReport {
        UnitReport {
            id,
            name: entry.name.clone(),
            priority: entry.priority,
            stack_size: entry.stack_size,
            unused_stack: entry.unused_stack,
            native: entry.native.map(NativeHandle::as_raw),
            reclaimable: entry.reclaimable,
        }
    }

    /// Report on one unit.
    pub fn get(&self, id: UnitId) -> Option<UnitReport> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_ref().map(|entry| Self::report(id, entry))
    }

    /// Reports on every entry, in slot order.
    pub fn snapshot(&self) -> Vec<UnitReport> {
        self.entries().map(|(id, e)| Self::report(id, e)).collect()
    }

    /// Entries whose units have not exited.
    pub fn live_count(&self) -> usize {
        self.entries().filter(|(_, e)| !e.reclaimable).count()
    }

    /// All entries, reclaimable ones included.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<N: NativeHandle> Default for Registry<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::bounded_name;

    fn params(name: &str) -> UnitParams {
        UnitParams {
            name: bounded_name(name),
            priority: 3,
            stack_size: 2048,
        }
    }

    #[test]
    fn test_register_and_bind() {
        let mut registry: Registry<usize> = Registry::new();
        let id = registry.register(&params("dcc"), Some(2048)).unwrap();
        assert!(registry.bind_native(id, 0x40));

        let report = registry.get(id).unwrap();
        assert_eq!(report.name.as_str(), "dcc");
        assert_eq!(report.native, Some(0x40));
        assert_eq!(report.unused_stack, Some(2048));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_reclaimable() {
        let mut registry: Registry<usize> = Registry::new();
        let a = registry.register(&params("a"), None).unwrap();
        let b = registry.register(&params("b"), None).unwrap();
        let c = registry.register(&params("c"), None).unwrap();

        assert!(registry.mark_reclaimable(a));
        assert!(registry.mark_reclaimable(c));
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.sweep(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(a).is_none());
        assert!(registry.get(b).is_some());
        assert_eq!(registry.sweep(), 0);
    }

    #[test]
    fn test_stale_id_after_reuse() {
        let mut registry: Registry<usize> = Registry::new();
        let old = registry.register(&params("old"), None).unwrap();
        assert!(registry.remove(old));

        let new = registry.register(&params("new"), None).unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);

        assert!(!registry.mark_reclaimable(old));
        assert!(!registry.bind_native(old, 1));
        assert!(!registry.remove(old));
        assert_eq!(registry.get(new).unwrap().name.as_str(), "new");
    }

    #[test]
    fn test_full_registry() {
        let mut registry: Registry<usize> = Registry::new();
        for _ in 0..MAX_UNITS {
            registry.register(&params("x"), None).unwrap();
        }
        assert_eq!(registry.register(&params("y"), None), Err(SpawnError::RegistryFull));
    }

    #[test]
    fn test_update_unused_skips_unbound() {
        let mut registry: Registry<usize> = Registry::new();
        let bound = registry.register(&params("bound"), Some(1024)).unwrap();
        let unbound = registry.register(&params("unbound"), Some(1024)).unwrap();
        registry.bind_native(bound, 7);

        assert!(registry.update_unused(bound.index(), |native| Some(native * 100)));
        assert!(!registry.update_unused(unbound.index(), |_| Some(0)));
        assert!(!registry.update_unused(99, |_| Some(0)));

        assert_eq!(registry.get(bound).unwrap().unused_stack, Some(700));
        assert_eq!(registry.get(unbound).unwrap().unused_stack, Some(1024));
    }

    #[test]
    fn test_exited_unit_is_not_measured() {
        let mut registry: Registry<usize> = Registry::new();
        let id = registry.register(&params("gone"), Some(512)).unwrap();
        registry.bind_native(id, 0x77);
        assert!(registry.mark_reclaimable(id));

        let mut queried = None;
        assert!(!registry.update_unused(id.index(), |native| {
            queried = Some(native);
            Some(0)
        }));
        assert_eq!(queried, None);

        let report = registry.get(id).unwrap();
        assert_eq!(report.native, None);
        assert_eq!(report.unused_stack, Some(512));
    }

    #[test]
    fn test_sweep_does_not_grow_storage() {
        let mut registry: Registry<usize> = Registry::new();
        let mut ids: Vec<UnitId> = (0..8).map(|_| registry.register(&params("x"), None).unwrap()).collect();
        let slots = registry.slots.capacity();
        let free = registry.free.capacity();
        assert!(free >= 8);

        for _ in 0..100 {
            for &id in &ids {
                registry.mark_reclaimable(id);
            }
            assert_eq!(registry.sweep(), 8);
            for id in ids.iter_mut() {
                *id = registry.register(&params("x"), None).unwrap();
            }
        }

        assert_eq!(registry.slot_count(), 8);
        assert_eq!(registry.slots.capacity(), slots);
        assert_eq!(registry.free.capacity(), free);
    }

    #[test]
    fn test_live_names_ignore_exited_units() {
        let mut registry: Registry<usize> = Registry::new();
        let id = registry.register(&params("thread.00"), None).unwrap();
        assert!(registry.contains_live_name("thread.00"));
        registry.mark_reclaimable(id);
        assert!(!registry.contains_live_name("thread.00"));
    }
}
