// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Module for Table. A table owns the live objects of one kind (keys or data)
//! and hands out [`Descriptor`]s naming them.
//!
//! Lookups return an [`Entry`], a shared reference to the object. Removing a
//! descriptor only makes it invisible to new lookups; the object itself is
//! dropped once the last outstanding [`Entry`] is released.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use parking_lot::RwLockWriteGuard;
use tracing::instrument;

use crate::errors::NcrError;

/// Number of slots addressable by the 16-bit index of a descriptor.
pub const MAX_TABLE_SLOTS: usize = 1 << 16;

// A slot whose generation wrapped is never reused.
const RETIRED_GENERATION: u16 = 0;

/// Opaque handle naming a live object in a table.
///
/// The low 16 bits carry the slot index and the high 16 bits the slot
/// generation, so a handle to a removed object never aliases a newer one
/// stored in the same slot. A slot is retired once its generation space is
/// exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(u32);

impl Descriptor {
    fn new(index: u16, generation: u16) -> Self {
        Self(((generation as u32) << 16) | index as u32)
    }

    /// Returns the slot index.
    pub fn index(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// Returns the slot generation.
    pub fn generation(&self) -> u16 {
        (self.0 >> 16) as u16
    }
}

impl From<u32> for Descriptor {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Descriptor> for u32 {
    fn from(value: Descriptor) -> Self {
        value.0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Shared reference to an object stored in a [`Table`].
///
/// Cloning takes a reference and dropping releases it.
pub(crate) struct Entry<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry").field("inner", &self.inner).finish()
    }
}

impl<T> Entry<T> {
    fn new(item: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(item)),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Returns the strong reference count of the Entry.
    ///
    /// Another thread can change the count at any time, including between
    /// calling this method and acting on the result.
    #[allow(unused)]
    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

/// Generation-checked, reference-counted object table.
#[derive(Debug)]
pub(crate) struct Table<T> {
    inner: RwLock<TableInner<T>>,
}

impl<T> Table<T> {
    /// Creates a table holding at most `capacity` live objects.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(TableInner::new(capacity.min(MAX_TABLE_SLOTS))),
        }
    }

    /// Stores `item` and returns its descriptor.
    ///
    /// # Errors
    /// * `NcrError::ReachedMaxObjects` - If every slot is occupied.
    #[instrument(skip_all)]
    pub(crate) fn insert(&self, item: T) -> Result<Descriptor, NcrError> {
        self.inner.write().insert(item)
    }

    /// Looks up a descriptor and takes a reference to its object.
    ///
    /// # Errors
    /// * `NcrError::NotFound` - If the descriptor is unknown or was removed.
    #[instrument(skip(self), fields(desc = %desc))]
    pub(crate) fn get(&self, desc: Descriptor) -> Result<Entry<T>, NcrError> {
        self.inner.read().get(desc)
    }

    /// Makes `desc` invisible and releases the table's reference.
    ///
    /// # Errors
    /// * `NcrError::NotFound` - If the descriptor is unknown or was removed.
    #[instrument(skip(self), fields(desc = %desc))]
    pub(crate) fn remove(&self, desc: Descriptor) -> Result<(), NcrError> {
        self.inner.write().remove(desc)
    }

    /// Returns the number of live descriptors.
    pub(crate) fn len(&self) -> usize {
        self.inner.read().len
    }

    /// Removes every descriptor.
    pub(crate) fn clear(&self) {
        self.inner.write().clear()
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u16,
    entry: Option<Entry<T>>,
}

#[derive(Debug)]
struct TableInner<T> {
    capacity: usize,
    len: usize,
    slots: Vec<Slot<T>>,
}

impl<T> TableInner<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            len: 0,
            slots: Vec::new(),
        }
    }

    fn insert(&mut self, item: T) -> Result<Descriptor, NcrError> {
        if self.len >= self.capacity {
            tracing::error!(error = ?NcrError::ReachedMaxObjects, capacity = self.capacity, "Table is full");
            Err(NcrError::ReachedMaxObjects)?
        }

        let free = self
            .slots
            .iter()
            .position(|slot| slot.entry.is_none() && slot.generation != RETIRED_GENERATION);

        let index = match free {
            Some(index) => index,
            None if self.slots.len() < MAX_TABLE_SLOTS => {
                self.slots.push(Slot {
                    generation: 1,
                    entry: None,
                });
                self.slots.len() - 1
            }
            None => {
                tracing::error!(error = ?NcrError::ReachedMaxObjects, "Every slot is retired or in use");
                Err(NcrError::ReachedMaxObjects)?
            }
        };

        let slot = &mut self.slots[index];
        slot.entry = Some(Entry::new(item));
        self.len += 1;

        let desc = Descriptor::new(index as u16, slot.generation);
        tracing::debug!(desc = %desc, "New Entry created");
        Ok(desc)
    }

    fn slot(&self, desc: Descriptor) -> Result<&Slot<T>, NcrError> {
        match self.slots.get(desc.index() as usize) {
            Some(slot) if slot.generation == desc.generation() && slot.entry.is_some() => Ok(slot),
            _ => {
                tracing::error!(error = ?NcrError::NotFound, desc = %desc, "Invalid descriptor");
                Err(NcrError::NotFound)
            }
        }
    }

    fn get(&self, desc: Descriptor) -> Result<Entry<T>, NcrError> {
        self.slot(desc)?.entry.clone().ok_or(NcrError::NotFound)
    }

    fn remove(&mut self, desc: Descriptor) -> Result<(), NcrError> {
        self.slot(desc)?;

        let slot = &mut self.slots[desc.index() as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        if slot.generation == RETIRED_GENERATION {
            tracing::debug!(index = desc.index(), "Slot retired");
        }
        self.len -= 1;

        tracing::debug!(desc = %desc, "Entry removed");
        Ok(())
    }

    fn clear(&mut self) {
        for slot in self.slots.iter_mut().filter(|slot| slot.entry.is_some()) {
            slot.entry = None;
            slot.generation = slot.generation.wrapping_add(1);
        }
        self.len = 0;
    }
}
