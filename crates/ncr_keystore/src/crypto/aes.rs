// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! OpenSSL-backed AES-ECB block cipher capability.
//!
//! Only single-block transforms are exposed. Padding is disabled, so each
//! 16-byte update produces exactly 16 bytes of output.

use openssl::cipher::Cipher;
use openssl::cipher::CipherRef;
use openssl::cipher_ctx::CipherCtx;
use zeroize::Zeroize;

use super::BlockCipher;
use super::CryptoError;
use super::AES_BLOCK_SIZE;

/// AES-ECB keyed with a single key for both directions.
///
/// Holds one initialized OpenSSL context per direction.
pub struct AesEcb {
    enc: CipherCtx,
    dec: CipherCtx,
}

impl std::fmt::Debug for AesEcb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesEcb").finish_non_exhaustive()
    }
}

impl AesEcb {
    /// Creates a cipher keyed with `key`.
    ///
    /// # Errors
    /// * `CryptoError::AesInvalidKeySize` - If the key is not 16, 24 or 32 bytes.
    /// * `CryptoError::AesInitError` - If OpenSSL rejects the context setup.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let cipher = Self::cipher(key.len())?;

        let mut enc = CipherCtx::new().map_err(|_| CryptoError::AesInitError)?;
        enc.encrypt_init(Some(cipher), Some(key), None)
            .map_err(|_| CryptoError::AesInitError)?;
        enc.set_padding(false);

        let mut dec = CipherCtx::new().map_err(|_| CryptoError::AesInitError)?;
        dec.decrypt_init(Some(cipher), Some(key), None)
            .map_err(|_| CryptoError::AesInitError)?;
        dec.set_padding(false);

        Ok(Self { enc, dec })
    }

    fn cipher(key_size: usize) -> Result<&'static CipherRef, CryptoError> {
        match key_size {
            16 => Ok(Cipher::aes_128_ecb()),
            24 => Ok(Cipher::aes_192_ecb()),
            32 => Ok(Cipher::aes_256_ecb()),
            _ => {
                tracing::error!(key_size, "Unsupported AES key size");
                Err(CryptoError::AesInvalidKeySize)
            }
        }
    }

    fn update(
        ctx: &mut CipherCtx,
        block: &mut [u8; AES_BLOCK_SIZE],
        err: CryptoError,
    ) -> Result<(), CryptoError> {
        // OpenSSL requires the output buffer to be a block larger than the input.
        let mut out = [0u8; AES_BLOCK_SIZE * 2];
        let result = match ctx.cipher_update(&block[..], Some(&mut out[..])) {
            Ok(AES_BLOCK_SIZE) => {
                block.copy_from_slice(&out[..AES_BLOCK_SIZE]);
                Ok(())
            }
            Ok(count) => {
                tracing::error!(count, "Unexpected AES-ECB output length");
                Err(err)
            }
            Err(_) => Err(err),
        };
        out.zeroize();
        result
    }
}

impl BlockCipher for AesEcb {
    fn encrypt_block(&mut self, block: &mut [u8; AES_BLOCK_SIZE]) -> Result<(), CryptoError> {
        Self::update(&mut self.enc, block, CryptoError::AesEncryptError)
    }

    fn decrypt_block(&mut self, block: &mut [u8; AES_BLOCK_SIZE]) -> Result<(), CryptoError> {
        Self::update(&mut self.dec, block, CryptoError::AesDecryptError)
    }
}
