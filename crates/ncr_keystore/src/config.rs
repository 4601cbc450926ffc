// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-device limits.

use crate::errors::NcrError;
use crate::table::MAX_TABLE_SLOTS;

/// Default number of live data objects per device.
pub const DEFAULT_MAX_DATA_OBJECTS: usize = 128;

/// Default number of live key objects per device.
pub const DEFAULT_MAX_KEY_OBJECTS: usize = 128;

/// Default upper bound for a data object's capacity.
pub const DEFAULT_MAX_DATA_SIZE: usize = 16 * 1024; // 16 KB

/// Default secret storage of a key object, in bytes.
pub const DEFAULT_MAX_KEY_SIZE: usize = 64;

/// Largest accepted data object capacity.
pub const MAX_DATA_SIZE: usize = 1024 * 1024; // 1 MB

/// Largest accepted key secret storage, in bytes.
pub const MAX_KEY_SIZE: usize = 4096;

/// Limits applied by an [`NcrDevice`](crate::device::NcrDevice).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NcrConfig {
    max_data_objects: usize,
    max_key_objects: usize,
    max_data_size: usize,
    max_key_size: usize,
}

impl Default for NcrConfig {
    fn default() -> Self {
        Self {
            max_data_objects: DEFAULT_MAX_DATA_OBJECTS,
            max_key_objects: DEFAULT_MAX_KEY_OBJECTS,
            max_data_size: DEFAULT_MAX_DATA_SIZE,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
        }
    }
}

impl NcrConfig {
    /// Creates a configuration with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of live data objects.
    pub fn with_max_data_objects(mut self, count: usize) -> Self {
        self.max_data_objects = count;
        self
    }

    /// Sets the number of live key objects.
    pub fn with_max_key_objects(mut self, count: usize) -> Self {
        self.max_key_objects = count;
        self
    }

    /// Sets the largest capacity a data object may request.
    pub fn with_max_data_size(mut self, size: usize) -> Self {
        self.max_data_size = size;
        self
    }

    /// Sets the secret storage of every new key object.
    pub fn with_max_key_size(mut self, size: usize) -> Self {
        self.max_key_size = size;
        self
    }

    /// Number of live data objects.
    pub fn max_data_objects(&self) -> usize {
        self.max_data_objects
    }

    /// Number of live key objects.
    pub fn max_key_objects(&self) -> usize {
        self.max_key_objects
    }

    /// Largest data object capacity.
    pub fn max_data_size(&self) -> usize {
        self.max_data_size
    }

    /// Key secret storage, in bytes.
    pub fn max_key_size(&self) -> usize {
        self.max_key_size
    }

    /// Checks that every limit is usable.
    ///
    /// # Errors
    /// * `NcrError::InvalidArgument` - If a limit is zero, an object count
    ///   does not fit the descriptor index space, or a size exceeds
    ///   [`MAX_DATA_SIZE`] or [`MAX_KEY_SIZE`].
    pub fn validate(&self) -> Result<(), NcrError> {
        let counts_ok = (1..=MAX_TABLE_SLOTS).contains(&self.max_data_objects)
            && (1..=MAX_TABLE_SLOTS).contains(&self.max_key_objects);
        let sizes_ok = (1..=MAX_DATA_SIZE).contains(&self.max_data_size)
            && (1..=MAX_KEY_SIZE).contains(&self.max_key_size);

        if !counts_ok || !sizes_ok {
            tracing::error!(config = ?self, "Invalid device configuration");
            Err(NcrError::InvalidArgument)?
        }

        Ok(())
    }
}
