// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cryptographic primitives backing the key store.
//!
//! - [`aes`]: the block cipher capability, a single 16-byte block encrypted or
//!   decrypted under a 128, 192 or 256-bit key.
//! - [`kw`]: the RFC 3394 key wrap engine built on that capability.
//! - [`rand`]: random bytes for key generation.

pub mod aes;
pub mod kw;
pub mod rand;

use thiserror::Error;

/// Size of one cipher block in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Errors reported by the cryptographic layer.
#[derive(Error, Debug, PartialEq, Eq, Copy, Clone)]
pub enum CryptoError {
    /// AES key size is not 16, 24 or 32 bytes.
    #[error("AES invalid key size")]
    AesInvalidKeySize,

    /// The OpenSSL cipher context could not be initialized.
    #[error("AES cipher initialization failed")]
    AesInitError,

    /// AES encryption operation failed.
    #[error("AES encryption failed")]
    AesEncryptError,

    /// AES decryption operation failed.
    #[error("AES decryption failed")]
    AesDecryptError,

    /// Key wrap input is empty, not a multiple of 8 bytes, or wrapped
    /// input is shorter than two semiblocks.
    #[error("key wrap invalid input size")]
    KwInvalidInputSize,

    /// The unwrapped integrity register does not match the expected IV.
    #[error("key wrap integrity check failed")]
    KwIntegrityCheckFailed,

    /// Random number generation failed.
    #[error("random number generation failed")]
    RngError,
}

/// Capability to transform one cipher block in place.
///
/// Implementations are keyed at construction; the key wrap engine only ever
/// sees this trait.
pub trait BlockCipher {
    /// Encrypts `block` in place.
    fn encrypt_block(&mut self, block: &mut [u8; AES_BLOCK_SIZE]) -> Result<(), CryptoError>;

    /// Decrypts `block` in place.
    fn decrypt_block(&mut self, block: &mut [u8; AES_BLOCK_SIZE]) -> Result<(), CryptoError>;
}
