// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Module for key objects and their metadata.

use std::fmt;

use bitfield_struct::bitfield;
use zeroize::Zeroizing;

use crate::crypto::rand::rand_bytes;
use crate::errors::NcrError;

/// Maximum length of a caller supplied key id.
pub const MAX_KEY_ID_SIZE: usize = 20;

/// Type of a key object.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyType {
    /// Freshly initialized, holds no material.
    Invalid = 0,

    /// Symmetric secret.
    Secret = 1,

    /// Public half of an asymmetric pair.
    Public = 2,

    /// Private half of an asymmetric pair.
    Private = 3,
}

impl TryFrom<u32> for KeyType {
    type Error = NcrError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            x if x == KeyType::Invalid as u32 => Ok(KeyType::Invalid),
            x if x == KeyType::Secret as u32 => Ok(KeyType::Secret),
            x if x == KeyType::Public as u32 => Ok(KeyType::Public),
            x if x == KeyType::Private as u32 => Ok(KeyType::Private),
            _ => Err(NcrError::InvalidArgument),
        }
    }
}

/// Algorithm a key is bound to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Algorithm {
    /// Not bound yet.
    None = 0,

    /// AES in CBC mode.
    AesCbc = 1,

    /// AES in ECB mode.
    AesEcb = 2,

    /// HMAC over SHA-1.
    HmacSha1 = 3,

    /// HMAC over SHA-256.
    HmacSha256 = 4,
}

impl TryFrom<u32> for Algorithm {
    type Error = NcrError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            x if x == Algorithm::None as u32 => Ok(Algorithm::None),
            x if x == Algorithm::AesCbc as u32 => Ok(Algorithm::AesCbc),
            x if x == Algorithm::AesEcb as u32 => Ok(Algorithm::AesEcb),
            x if x == Algorithm::HmacSha1 as u32 => Ok(Algorithm::HmacSha1),
            x if x == Algorithm::HmacSha256 as u32 => Ok(Algorithm::HmacSha256),
            _ => {
                tracing::error!(algorithm = value, "Unknown algorithm id");
                Err(NcrError::Unsupported)
            }
        }
    }
}

impl Algorithm {
    fn is_aes(&self) -> bool {
        matches!(self, Algorithm::AesCbc | Algorithm::AesEcb)
    }

    fn is_symmetric(&self) -> bool {
        !matches!(self, Algorithm::None)
    }
}

/// Metadata flags for a key object.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct KeyFlags {
    /// Tells if the secret may be exported in the clear
    pub exportable: bool,

    /// Tells if the key may be wrapped by another key
    pub wrappable: bool,

    #[bits(6)]
    __: u8,
}

/// Public view of a key object. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub key_type: KeyType,
    pub algorithm: Algorithm,
    pub flags: KeyFlags,
    pub size: usize,
    pub key_id: Vec<u8>,
}

/// A key object.
pub struct KeyItem {
    key_type: KeyType,
    algorithm: Algorithm,
    flags: KeyFlags,
    key_id: Vec<u8>,
    secret: Zeroizing<Vec<u8>>,
    max_size: usize,
}

impl fmt::Debug for KeyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyItem")
            .field("key_type", &self.key_type)
            .field("algorithm", &self.algorithm)
            .field("flags", &self.flags)
            .field("size", &self.secret.len())
            .finish_non_exhaustive()
    }
}

impl KeyItem {
    /// Creates an empty key that can hold up to `max_size` secret bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            key_type: KeyType::Invalid,
            algorithm: Algorithm::None,
            flags: KeyFlags::new(),
            key_id: Vec::new(),
            secret: Zeroizing::new(Vec::new()),
            max_size,
        }
    }

    /// Type of the held material.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Algorithm the key is bound to.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Access flags.
    pub fn flags(&self) -> KeyFlags {
        self.flags
    }

    /// Secret storage capacity in bytes.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Secret length in bytes.
    pub fn size(&self) -> usize {
        self.secret.len()
    }

    pub(crate) fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Snapshot of the key's metadata.
    pub fn info(&self) -> KeyInfo {
        KeyInfo {
            key_type: self.key_type,
            algorithm: self.algorithm,
            flags: self.flags,
            size: self.secret.len(),
            key_id: self.key_id.clone(),
        }
    }

    /// Populates the key from caller supplied material.
    ///
    /// # Arguments
    /// * `material` - Secret bytes.
    /// * `key_type` - Must be [`KeyType::Secret`].
    /// * `algorithm` - Algorithm binding.
    /// * `flags` - Flags after any policy adjustment by the caller.
    /// * `key_id` - Caller chosen id, at most [`MAX_KEY_ID_SIZE`] bytes.
    ///
    /// # Errors
    /// * `NcrError::InvalidArgument` - If the key id is too long.
    /// * `NcrError::Unsupported` - If `key_type` is not a secret key.
    /// * `NcrError::BufferTooSmall` - If `material` does not fit the key.
    pub(crate) fn import(
        &mut self,
        material: &[u8],
        key_type: KeyType,
        algorithm: Algorithm,
        flags: KeyFlags,
        key_id: &[u8],
    ) -> Result<(), NcrError> {
        if key_id.len() > MAX_KEY_ID_SIZE {
            tracing::error!(error = ?NcrError::InvalidArgument, len = key_id.len(), "Key id too long");
            Err(NcrError::InvalidArgument)?
        }

        if key_type != KeyType::Secret {
            tracing::error!(error = ?NcrError::Unsupported, ?key_type, "Only secret keys can be imported");
            Err(NcrError::Unsupported)?
        }

        self.check_capacity(material.len())?;

        self.key_type = key_type;
        self.algorithm = algorithm;
        self.flags = flags;
        self.key_id = key_id.to_vec();
        self.store(material);
        Ok(())
    }

    /// Fills the key with `bits` random bits.
    ///
    /// # Errors
    /// * `NcrError::Unsupported` - If `algorithm` cannot be generated.
    /// * `NcrError::InvalidArgument` - If `bits` is zero, not byte aligned or not a valid AES size.
    /// * `NcrError::BufferTooSmall` - If the key cannot hold `bits`.
    /// * `NcrError::Crypto` - If the RNG fails.
    pub(crate) fn generate(
        &mut self,
        algorithm: Algorithm,
        flags: KeyFlags,
        bits: usize,
    ) -> Result<(), NcrError> {
        if !algorithm.is_symmetric() {
            tracing::error!(error = ?NcrError::Unsupported, ?algorithm, "Cannot generate key for algorithm");
            Err(NcrError::Unsupported)?
        }

        if bits == 0 || bits % 8 != 0 || (algorithm.is_aes() && ![128, 192, 256].contains(&bits)) {
            tracing::error!(error = ?NcrError::InvalidArgument, bits, ?algorithm, "Invalid key length");
            Err(NcrError::InvalidArgument)?
        }

        self.check_capacity(bits / 8)?;

        let mut material = Zeroizing::new(vec![0u8; bits / 8]);
        rand_bytes(&mut material)?;

        self.key_type = KeyType::Secret;
        self.algorithm = algorithm;
        self.flags = flags;
        self.key_id.clear();
        self.store(&material);
        Ok(())
    }

    /// Replaces the secret with unwrapped material. The algorithm binding is
    /// kept.
    ///
    /// # Errors
    /// * `NcrError::BufferTooSmall` - If `material` does not fit the key.
    pub(crate) fn set_unwrapped(&mut self, material: &[u8], flags: KeyFlags) -> Result<(), NcrError> {
        self.check_capacity(material.len())?;

        self.key_type = KeyType::Secret;
        self.flags = flags;
        self.store(material);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_flags(&mut self, flags: KeyFlags) {
        self.flags = flags;
    }

    fn check_capacity(&self, size: usize) -> Result<(), NcrError> {
        if size > self.max_size {
            tracing::error!(error = ?NcrError::BufferTooSmall, size, max_size = self.max_size, "Key material exceeds capacity");
            Err(NcrError::BufferTooSmall)?
        }
        Ok(())
    }

    fn store(&mut self, material: &[u8]) {
        // Zeroizing wipes the previous contents on drop.
        self.secret = Zeroizing::new(material.to_vec());
    }
}
