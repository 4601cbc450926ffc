// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Data objects: bounded byte buffers holding key material, wrapped blobs or
//! any other payload a caller moves in and out of the device.

use std::fmt;

use bitfield_struct::bitfield;
use zeroize::Zeroize;
use zeroize::Zeroizing;

use crate::errors::NcrError;

/// Metadata flags for a data object.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct DataFlags {
    /// Tells if the payload may be read back by the caller
    pub exportable: bool,

    #[bits(7)]
    __: u8,
}

/// A data object. The payload never exceeds the capacity fixed at creation.
pub struct DataItem {
    flags: DataFlags,
    max_size: usize,
    data: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataItem")
            .field("flags", &self.flags)
            .field("max_size", &self.max_size)
            .field("size", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl DataItem {
    /// Creates a data object with room for `max_size` bytes.
    ///
    /// # Arguments
    /// * `max_size` - Capacity of the object.
    /// * `flags` - Metadata flags.
    /// * `initial` - Initial payload, possibly empty.
    ///
    /// # Errors
    /// * `NcrError::BufferTooSmall` - If `initial` is larger than `max_size`.
    /// * `NcrError::OutOfMemory` - If the storage cannot be allocated.
    pub fn new(max_size: usize, flags: DataFlags, initial: &[u8]) -> Result<Self, NcrError> {
        if initial.len() > max_size {
            tracing::error!(error = ?NcrError::BufferTooSmall, max_size, size = initial.len(), "Initial payload exceeds capacity");
            Err(NcrError::BufferTooSmall)?
        }

        let mut data = Zeroizing::new(Vec::new());
        data.try_reserve_exact(max_size).map_err(|err| {
            tracing::error!(error = ?NcrError::OutOfMemory, max_size, ?err, "Cannot allocate data object");
            NcrError::OutOfMemory
        })?;
        data.extend_from_slice(initial);

        Ok(Self {
            flags,
            max_size,
            data,
        })
    }

    /// Metadata flags.
    pub fn flags(&self) -> DataFlags {
        self.flags
    }

    /// Capacity fixed at creation.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Current payload length.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Payload as seen by other device operations. Not gated by the
    /// exportable flag.
    pub(crate) fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Overwrites or appends to the payload.
    ///
    /// # Errors
    /// * `NcrError::BufferTooSmall` - If the resulting payload would exceed the capacity.
    pub fn set(&mut self, bytes: &[u8], append: bool) -> Result<(), NcrError> {
        let base = if append { self.data.len() } else { 0 };
        if base + bytes.len() > self.max_size {
            tracing::error!(error = ?NcrError::BufferTooSmall, max_size = self.max_size, size = base + bytes.len(), "Data exceeds capacity");
            Err(NcrError::BufferTooSmall)?
        }

        // Bytes past the new length stay in the allocation otherwise.
        self.data[base..].zeroize();
        self.data.truncate(base);
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Copies up to `capacity` bytes of the payload into `out`.
    ///
    /// With `append` set the bytes are added after the current contents of
    /// `out`; otherwise `out` is replaced.
    ///
    /// # Returns
    /// * Number of bytes copied.
    ///
    /// # Errors
    /// * `NcrError::PermissionDenied` - If the object is not exportable.
    pub fn get(&self, out: &mut Vec<u8>, capacity: usize, append: bool) -> Result<usize, NcrError> {
        if !self.flags.exportable() {
            tracing::error!(error = ?NcrError::PermissionDenied, "Data object is not exportable");
            Err(NcrError::PermissionDenied)?
        }

        let count = capacity.min(self.data.len());
        if !append {
            out.clear();
        }
        out.extend_from_slice(&self.data[..count]);
        Ok(count)
    }

    /// Replaces payload and flags together.
    ///
    /// # Errors
    /// * `NcrError::BufferTooSmall` - If `bytes` exceeds the capacity. The object is left unchanged.
    pub(crate) fn replace(&mut self, bytes: &[u8], flags: DataFlags) -> Result<(), NcrError> {
        self.set(bytes, false)?;
        self.flags = flags;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_with_tracing::test;

    use super::*;

    fn exportable() -> DataFlags {
        DataFlags::new().with_exportable(true)
    }

    #[test]
    fn test_new() {
        let item = DataItem::new(16, exportable(), b"hello").expect("new failed");
        assert_eq!(item.size(), 5);
        assert_eq!(item.max_size(), 16);
        assert!(item.flags().exportable());
        assert_eq!(item.contents(), b"hello");
    }

    #[test]
    fn test_new_initial_too_large() {
        assert_eq!(
            DataItem::new(4, exportable(), b"hello").map(|_| ()),
            Err(NcrError::BufferTooSmall)
        );
        assert!(DataItem::new(5, exportable(), b"hello").is_ok());
    }

    #[test]
    fn test_new_allocation_failure() {
        assert_eq!(
            DataItem::new(usize::MAX, exportable(), b"").map(|_| ()),
            Err(NcrError::OutOfMemory)
        );
    }

    #[test]
    fn test_set_overwrite_and_append() {
        let mut item = DataItem::new(8, exportable(), b"abc").expect("new failed");

        item.set(b"xy", false).expect("set failed");
        assert_eq!(item.contents(), b"xy");

        item.set(b"zzz", true).expect("set failed");
        assert_eq!(item.contents(), b"xyzzz");

        assert_eq!(item.set(b"0123", true), Err(NcrError::BufferTooSmall));
        assert_eq!(item.contents(), b"xyzzz");

        item.set(b"01234567", false).expect("set failed");
        assert_eq!(item.size(), 8);
    }

    /// Returns the first `max_size` bytes of the allocation, including bytes
    /// past the payload.
    fn raw_buffer(item: &DataItem) -> Vec<u8> {
        let len = item.data.len();
        assert!(item.data.capacity() >= item.max_size);
        // SAFETY: every byte up to `max_size` was written by an earlier set.
        let tail = unsafe { std::slice::from_raw_parts(item.data.as_ptr().add(len), item.max_size - len) };
        [&item.data[..], tail].concat()
    }

    #[test]
    fn test_overwrite_wipes_previous_payload() {
        let mut item = DataItem::new(16, exportable(), b"").expect("new failed");

        item.set(b"SECRETSECRETSECR", false).expect("set failed");
        item.set(b"x", false).expect("set failed");

        assert_eq!(item.contents(), b"x");
        let raw = raw_buffer(&item);
        assert_eq!(raw.len(), 16);
        assert_eq!(&raw[1..], &[0u8; 15]);
    }

    #[test]
    fn test_replace_wipes_previous_payload() {
        let mut item = DataItem::new(8, DataFlags::new(), b"").expect("new failed");
        item.set(b"abcdefgh", false).expect("set failed");

        item.replace(b"12", exportable()).expect("replace failed");
        assert_eq!(raw_buffer(&item), b"12\0\0\0\0\0\0");
    }

    #[test]
    fn test_get() {
        let item = DataItem::new(8, exportable(), b"abcdef").expect("new failed");

        let mut out = b"stale".to_vec();
        assert_eq!(item.get(&mut out, 64, false), Ok(6));
        assert_eq!(out, b"abcdef");

        assert_eq!(item.get(&mut out, 2, true), Ok(2));
        assert_eq!(out, b"abcdefab");

        assert_eq!(item.get(&mut out, 0, false), Ok(0));
        assert!(out.is_empty());
    }

    #[test]
    fn test_get_not_exportable() {
        let item = DataItem::new(8, DataFlags::new(), b"secret").expect("new failed");

        let mut out = Vec::new();
        assert_eq!(item.get(&mut out, 8, false), Err(NcrError::PermissionDenied));
        assert!(out.is_empty());

        // Still visible to the device itself.
        assert_eq!(item.contents(), b"secret");
    }

    #[test]
    fn test_replace_keeps_object_on_failure() {
        let mut item = DataItem::new(4, DataFlags::new(), b"ab").expect("new failed");

        assert_eq!(item.replace(b"12345", exportable()), Err(NcrError::BufferTooSmall));
        assert_eq!(item.contents(), b"ab");
        assert!(!item.flags().exportable());

        item.replace(b"1234", exportable()).expect("replace failed");
        assert_eq!(item.contents(), b"1234");
        assert!(item.flags().exportable());
    }

    #[test]
    fn test_debug_redacts_payload() {
        let item = DataItem::new(8, exportable(), b"\x13\x37secret").expect("new failed");
        let output = format!("{item:?}");
        assert!(!output.contains("secret"));
        assert!(output.contains("size: 8"));
    }
}
