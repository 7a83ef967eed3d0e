//! Station arena.
//!
//! Maps host-assigned station ids to compact handles and stores one record
//! per attached station. Every per-station table in the scheduler is keyed
//! by handle.

use rustc_hash::FxHashMap;

use crate::models::StationId;

/// Stable handle for an attached station (u32 for compact storage and fast hashing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationHandle(pub u32);

/// Arena of per-station records with handle reuse after detach.
#[derive(Debug, Clone)]
pub struct StationArena<T> {
    handles: FxHashMap<StationId, StationHandle>,
    slots: Vec<Option<(StationId, T)>>,
    free: Vec<u32>,
}

impl<T> StationArena<T> {
    /// Create a new arena with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    /// Insert a record for `id`, returning its handle and whether it is new.
    /// If already present, the existing record is kept.
    pub fn insert_with(&mut self, id: StationId, make: impl FnOnce() -> T) -> (StationHandle, bool) {
        if let Some(&handle) = self.handles.get(&id) {
            return (handle, false);
        }
        let record = Some((id, make()));
        let handle = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = record;
                StationHandle(index)
            }
            None => {
                self.slots.push(record);
                StationHandle((self.slots.len() - 1) as u32)
            }
        };
        self.handles.insert(id, handle);
        (handle, true)
    }

    /// Remove `id`, returning the handle it held.
    pub fn remove(&mut self, id: StationId) -> Option<(StationHandle, T)> {
        let handle = self.handles.remove(&id)?;
        let (_, record) = self.slots[handle.0 as usize].take()?;
        self.free.push(handle.0);
        Some((handle, record))
    }

    /// Get the handle for an id, if attached.
    #[inline]
    pub fn handle(&self, id: StationId) -> Option<StationHandle> {
        self.handles.get(&id).copied()
    }

    /// Get the station id for a handle.
    #[inline]
    pub fn id(&self, handle: StationHandle) -> Option<StationId> {
        self.slots
            .get(handle.0 as usize)
            .and_then(|s| s.as_ref())
            .map(|(id, _)| *id)
    }

    #[inline]
    pub fn get(&self, handle: StationHandle) -> Option<&T> {
        self.slots
            .get(handle.0 as usize)
            .and_then(|s| s.as_ref())
            .map(|(_, r)| r)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: StationHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.0 as usize)
            .and_then(|s| s.as_mut())
            .map(|(_, r)| r)
    }

    /// Attached handles in ascending handle order.
    pub fn handles(&self) -> Vec<StationHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| StationHandle(i as u32))
            .collect()
    }

    /// Mutable iteration over records in ascending handle order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (StationHandle, StationId, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            s.as_mut()
                .map(|(id, r)| (StationHandle(i as u32), *id, r))
        })
    }

    /// Number of attached stations.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<T> Default for StationArena<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
