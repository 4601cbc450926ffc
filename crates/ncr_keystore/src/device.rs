// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The control surface of the key store.
//!
//! An [`NcrDevice`] corresponds to one opened context. It owns a key table and
//! a data table; descriptors it hands out are only meaningful to it.

use tracing::instrument;
use zeroize::Zeroizing;

use crate::access::imported_key_flags;
use crate::access::key_flags_to_data;
use crate::config::NcrConfig;
use crate::data::DataFlags;
use crate::data::DataItem;
use crate::errors::NcrError;
use crate::key::Algorithm;
use crate::key::KeyFlags;
use crate::key::KeyInfo;
use crate::key::KeyItem;
use crate::key::KeyType;
use crate::key_wrap::unwrap_key;
use crate::key_wrap::wrap_key;
use crate::table::Descriptor;
use crate::table::Table;

/// DataInit request.
#[derive(Clone, Copy)]
pub struct DataInitReq<'a> {
    /// Capacity of the new object.
    pub max_object_size: usize,
    pub flags: DataFlags,
    /// Initial payload, possibly empty.
    pub initial: &'a [u8],
}

impl std::fmt::Debug for DataInitReq<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataInitReq")
            .field("max_object_size", &self.max_object_size)
            .field("flags", &self.flags)
            .field("initial_len", &self.initial.len())
            .finish()
    }
}

/// KeyImport request.
#[derive(Debug, Clone, Copy)]
pub struct KeyImportReq<'a> {
    /// Key object to populate.
    pub key: Descriptor,
    /// Data object holding the material.
    pub data: Descriptor,
    pub key_type: KeyType,
    pub algorithm: Algorithm,
    pub flags: KeyFlags,
    pub key_id: &'a [u8],
}

/// KeyGenerate request.
#[derive(Debug, Clone, Copy)]
pub struct KeyGenerateReq {
    pub key: Descriptor,
    pub algorithm: Algorithm,
    pub flags: KeyFlags,
    /// Key length in bits.
    pub bits: usize,
}

/// KeyWrap and KeyUnwrap request.
#[derive(Clone, Copy)]
pub struct KeyWrapReq<'a> {
    /// Key to wrap, or the destination key on unwrap.
    pub key: Descriptor,
    /// Key encryption key.
    pub kek: Descriptor,
    /// Output data object on wrap, input data object on unwrap.
    pub data: Descriptor,
    /// Wrap algorithm id, see [`WrapAlgorithm`](crate::key_wrap::WrapAlgorithm).
    pub algorithm: u32,
    /// Optional integrity value.
    pub iv: Option<&'a [u8]>,
}

impl std::fmt::Debug for KeyWrapReq<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyWrapReq")
            .field("key", &self.key)
            .field("kek", &self.kek)
            .field("data", &self.data)
            .field("algorithm", &self.algorithm)
            .field("iv_len", &self.iv.map(<[u8]>::len))
            .finish()
    }
}

/// One opened key store context.
#[derive(Debug)]
pub struct NcrDevice {
    config: NcrConfig,
    keys: Table<KeyItem>,
    data: Table<DataItem>,
}

impl Default for NcrDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl NcrDevice {
    /// Creates a device with the default limits.
    pub fn new() -> Self {
        Self::build(NcrConfig::default())
    }

    /// Creates a device with custom limits.
    ///
    /// # Errors
    /// * `NcrError::InvalidArgument` - If the configuration is not usable.
    pub fn with_config(config: NcrConfig) -> Result<Self, NcrError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: NcrConfig) -> Self {
        tracing::debug!(?config, "Device opened");
        Self {
            config,
            keys: Table::new(config.max_key_objects()),
            data: Table::new(config.max_data_objects()),
        }
    }

    /// Limits this device was opened with.
    pub fn config(&self) -> &NcrConfig {
        &self.config
    }

    /// Number of live data objects.
    pub fn data_count(&self) -> usize {
        self.data.len()
    }

    /// Number of live key objects.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Creates a data object.
    ///
    /// # Errors
    /// * `NcrError::InvalidArgument` - If `max_object_size` is zero or above the configured maximum.
    /// * `NcrError::BufferTooSmall` - If the initial payload exceeds `max_object_size`.
    /// * `NcrError::ReachedMaxObjects` - If the data table is full.
    /// * `NcrError::OutOfMemory` - If the object's storage cannot be allocated.
    #[instrument(skip_all, fields(max_object_size = req.max_object_size))]
    pub fn data_init(&self, req: &DataInitReq<'_>) -> Result<Descriptor, NcrError> {
        if req.max_object_size == 0 || req.max_object_size > self.config.max_data_size() {
            tracing::error!(
                error = ?NcrError::InvalidArgument,
                max_object_size = req.max_object_size,
                limit = self.config.max_data_size(),
                "Invalid data object size"
            );
            Err(NcrError::InvalidArgument)?
        }

        let item = DataItem::new(req.max_object_size, req.flags, req.initial)?;
        self.data.insert(item)
    }

    /// Reads a data object's payload into `out`.
    ///
    /// # Returns
    /// * Number of bytes copied.
    ///
    /// # Errors
    /// * `NcrError::NotFound` - If `desc` does not name a data object.
    /// * `NcrError::PermissionDenied` - If the object is not exportable.
    #[instrument(skip(self, out), fields(desc = %desc))]
    pub fn data_get(
        &self,
        desc: Descriptor,
        out: &mut Vec<u8>,
        capacity: usize,
        append: bool,
    ) -> Result<usize, NcrError> {
        self.data.get(desc)?.read().get(out, capacity, append)
    }

    /// Writes to a data object's payload.
    ///
    /// # Errors
    /// * `NcrError::NotFound` - If `desc` does not name a data object.
    /// * `NcrError::BufferTooSmall` - If the result would exceed the object's capacity.
    #[instrument(skip(self, bytes), fields(desc = %desc, len = bytes.len()))]
    pub fn data_set(&self, desc: Descriptor, bytes: &[u8], append: bool) -> Result<(), NcrError> {
        self.data.get(desc)?.write().set(bytes, append)
    }

    /// Destroys a data object.
    ///
    /// References held by in-flight operations keep the object alive until
    /// they complete.
    #[instrument(skip(self), fields(desc = %desc))]
    pub fn data_deinit(&self, desc: Descriptor) -> Result<(), NcrError> {
        self.data.remove(desc)
    }

    /// Creates an empty key object.
    ///
    /// # Errors
    /// * `NcrError::ReachedMaxObjects` - If the key table is full.
    #[instrument(skip(self))]
    pub fn key_init(&self) -> Result<Descriptor, NcrError> {
        self.keys.insert(KeyItem::new(self.config.max_key_size()))
    }

    /// Populates a key from the payload of a data object.
    ///
    /// # Errors
    /// * `NcrError::NotFound` - If either descriptor is unknown.
    /// * `NcrError::InvalidArgument` - If the key id is too long.
    /// * `NcrError::Unsupported` - If the key type is not importable.
    /// * `NcrError::BufferTooSmall` - If the payload does not fit the key.
    #[instrument(skip_all, fields(key = %req.key, data = %req.data))]
    pub fn key_import(&self, req: &KeyImportReq<'_>) -> Result<(), NcrError> {
        let key = self.keys.get(req.key)?;
        let data = self.data.get(req.data)?;

        let (material, source_flags) = {
            let data = data.read();
            (Zeroizing::new(data.contents().to_vec()), data.flags())
        };

        key.write().import(
            &material,
            req.key_type,
            req.algorithm,
            imported_key_flags(req.flags, source_flags),
            req.key_id,
        )?;
        Ok(())
    }

    /// Copies a key's secret into a data object.
    ///
    /// # Errors
    /// * `NcrError::NotFound` - If either descriptor is unknown.
    /// * `NcrError::PermissionDenied` - If the key is not exportable.
    /// * `NcrError::BufferTooSmall` - If the data object cannot hold the secret.
    #[instrument(skip(self), fields(key = %key_desc, data = %data_desc))]
    pub fn key_export(&self, key_desc: Descriptor, data_desc: Descriptor) -> Result<(), NcrError> {
        let key = self.keys.get(key_desc)?;
        let data = self.data.get(data_desc)?;

        let (secret, flags) = {
            let key = key.read();
            if !key.flags().exportable() {
                tracing::error!(error = ?NcrError::PermissionDenied, "Key is not exportable");
                Err(NcrError::PermissionDenied)?
            }
            (Zeroizing::new(key.secret().to_vec()), key.flags())
        };

        data.write().replace(&secret, key_flags_to_data(flags))?;
        Ok(())
    }

    /// Fills a key with random material.
    ///
    /// # Errors
    /// * `NcrError::NotFound` - If the descriptor is unknown.
    /// * `NcrError::Unsupported` - If the algorithm cannot be generated.
    /// * `NcrError::InvalidArgument` - If the bit length is not valid for the algorithm.
    /// * `NcrError::BufferTooSmall` - If the key cannot hold the requested length.
    #[instrument(skip_all, fields(key = %req.key, algorithm = ?req.algorithm, bits = req.bits))]
    pub fn key_generate(&self, req: &KeyGenerateReq) -> Result<(), NcrError> {
        self.keys
            .get(req.key)?
            .write()
            .generate(req.algorithm, req.flags, req.bits)
    }

    /// Returns a key's metadata.
    #[instrument(skip(self), fields(key = %desc))]
    pub fn key_info(&self, desc: Descriptor) -> Result<KeyInfo, NcrError> {
        Ok(self.keys.get(desc)?.read().info())
    }

    /// Destroys a key object.
    #[instrument(skip(self), fields(key = %desc))]
    pub fn key_deinit(&self, desc: Descriptor) -> Result<(), NcrError> {
        self.keys.remove(desc)
    }

    /// Wraps `req.key` under `req.kek` into the data object `req.data`.
    ///
    /// # Errors
    /// * `NcrError::NotFound` - If any descriptor is unknown.
    /// * `NcrError::PermissionDenied` - If the key is not wrappable.
    /// * `NcrError::InvalidKeyType` - If the key is not a secret key.
    /// * `NcrError::Unsupported` - If the algorithm id is unknown.
    /// * `NcrError::InvalidLength` - If the secret is not a multiple of 8 bytes.
    /// * `NcrError::BufferTooSmall` - If the data object cannot hold the result.
    #[instrument(skip_all, fields(key = %req.key, kek = %req.kek, data = %req.data))]
    pub fn key_wrap(&self, req: &KeyWrapReq<'_>) -> Result<(), NcrError> {
        let key = self.keys.get(req.key)?;
        let kek = self.keys.get(req.kek)?;
        let data = self.data.get(req.data)?;

        wrap_key(&key, &kek, &data, req.algorithm, req.iv)
    }

    /// Unwraps the data object `req.data` under `req.kek` into the key `req.key`.
    ///
    /// The resulting key is wrappable and never exportable.
    ///
    /// # Errors
    /// * `NcrError::NotFound` - If any descriptor is unknown.
    /// * `NcrError::Unsupported` - If the algorithm id is unknown.
    /// * `NcrError::InvalidLength` - If the blob length is invalid.
    /// * `NcrError::BufferTooSmall` - If the key cannot hold the unwrapped secret.
    /// * `NcrError::IntegrityCheckFailed` - If the blob fails authentication.
    #[instrument(skip_all, fields(key = %req.key, kek = %req.kek, data = %req.data))]
    pub fn key_unwrap(&self, req: &KeyWrapReq<'_>) -> Result<(), NcrError> {
        let key = self.keys.get(req.key)?;
        let kek = self.keys.get(req.kek)?;
        let data = self.data.get(req.data)?;

        unwrap_key(&key, &kek, &data, req.algorithm, req.iv)
    }
}

impl Drop for NcrDevice {
    fn drop(&mut self) {
        tracing::debug!(
            keys = self.keys.len(),
            data = self.data.len(),
            "Device closed, releasing objects"
        );
        self.keys.clear();
        self.data.clear();
    }
}
