// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! AES Key Wrap (RFC 3394).
//!
//! Key material is split into `n` 64-bit registers `R[0..n]` and run through
//! `6n` cipher rounds together with the integrity register `A`. The wrapped
//! form is `A || R[0] || .. || R[n-1]`, eight bytes longer than the input.
//!
//! The register array is never shifted. A rotating `head` index names the
//! slot that currently holds `R[0]`; rotating it left by one is exactly the
//! RFC's "shift registers down and store the new value in `R[n-1]`".

use zeroize::Zeroize;
use zeroize::Zeroizing;

use super::BlockCipher;
use super::CryptoError;
use super::AES_BLOCK_SIZE;

/// One 64-bit half block.
pub type Val64 = [u8; KW_SEMIBLOCK_SIZE];

/// Size of a register in bytes.
pub const KW_SEMIBLOCK_SIZE: usize = 8;

/// RFC 3394 section 2.2.3.1 default initial value.
pub const KW_DEFAULT_IV: Val64 = [0xA6; KW_SEMIBLOCK_SIZE];

/// RFC 3394 key wrap engine.
///
/// The engine is stateless apart from the integrity value it checks against,
/// so one instance may wrap and unwrap any number of keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesKeyWrap {
    iv: Val64,
}

impl Default for AesKeyWrap {
    fn default() -> Self {
        Self::with_default_iv()
    }
}

impl AesKeyWrap {
    /// Creates an engine using `A6A6A6A6A6A6A6A6`.
    pub fn with_default_iv() -> Self {
        Self { iv: KW_DEFAULT_IV }
    }

    /// Creates an engine from a caller supplied IV.
    ///
    /// IVs shorter than one register fall back to the default value; longer
    /// ones contribute their first eight bytes.
    pub fn with_iv(iv: Option<&[u8]>) -> Self {
        match iv {
            Some(iv) if iv.len() >= KW_SEMIBLOCK_SIZE => {
                let mut value = [0u8; KW_SEMIBLOCK_SIZE];
                value.copy_from_slice(&iv[..KW_SEMIBLOCK_SIZE]);
                Self { iv: value }
            }
            _ => Self::with_default_iv(),
        }
    }

    /// Returns the integrity value in use.
    pub fn iv(&self) -> &Val64 {
        &self.iv
    }

    /// Returns the wrapped size for `len` bytes of key material.
    pub fn wrapped_len(len: usize) -> usize {
        len + KW_SEMIBLOCK_SIZE
    }

    /// Wraps `plain` under the key `cipher` was created with.
    ///
    /// # Errors
    /// * `CryptoError::KwInvalidInputSize` - If `plain` is empty or not a multiple of 8 bytes.
    /// * Any error of the block cipher.
    pub fn wrap<C: BlockCipher>(&self, cipher: &mut C, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plain.is_empty() || plain.len() % KW_SEMIBLOCK_SIZE != 0 {
            tracing::error!(len = plain.len(), "Key wrap input is not a whole number of registers");
            Err(CryptoError::KwInvalidInputSize)?
        }

        let n = plain.len() / KW_SEMIBLOCK_SIZE;
        let mut regs = load_registers(plain);
        let mut a = self.iv;
        let mut block = Zeroizing::new([0u8; AES_BLOCK_SIZE]);
        let mut head = 0;

        for t in 1..=(6 * n as u64) {
            // B = AES(K, A | R[0])
            block[..KW_SEMIBLOCK_SIZE].copy_from_slice(&a);
            block[KW_SEMIBLOCK_SIZE..].copy_from_slice(&regs[head]);
            cipher.encrypt_block(&mut block)?;

            // A = MSB(64, B) ^ t
            a.copy_from_slice(&block[..KW_SEMIBLOCK_SIZE]);
            xor_counter(&mut a, t);

            // Shift left; R[n-1] = LSB(64, B)
            regs[head].copy_from_slice(&block[KW_SEMIBLOCK_SIZE..]);
            head = (head + 1) % n;
        }
        debug_assert_eq!(head, 0);

        let mut output = Vec::with_capacity(Self::wrapped_len(plain.len()));
        output.extend_from_slice(&a);
        for reg in regs.iter() {
            output.extend_from_slice(reg);
        }

        Ok(output)
    }

    /// Unwraps `wrapped` and verifies the integrity register.
    ///
    /// The returned bytes are only produced once the check has passed.
    ///
    /// # Errors
    /// * `CryptoError::KwInvalidInputSize` - If `wrapped` is not a multiple of 8 bytes or shorter than 16.
    /// * `CryptoError::KwIntegrityCheckFailed` - If the final `A` differs from the IV.
    /// * Any error of the block cipher.
    pub fn unwrap<C: BlockCipher>(
        &self,
        cipher: &mut C,
        wrapped: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if wrapped.len() < 2 * KW_SEMIBLOCK_SIZE || wrapped.len() % KW_SEMIBLOCK_SIZE != 0 {
            tracing::error!(len = wrapped.len(), "Wrapped key has invalid length");
            Err(CryptoError::KwInvalidInputSize)?
        }

        let n = wrapped.len() / KW_SEMIBLOCK_SIZE - 1;
        let mut a = [0u8; KW_SEMIBLOCK_SIZE];
        a.copy_from_slice(&wrapped[..KW_SEMIBLOCK_SIZE]);
        let mut regs = load_registers(&wrapped[KW_SEMIBLOCK_SIZE..]);
        let mut block = Zeroizing::new([0u8; AES_BLOCK_SIZE]);
        let mut head = 0;

        for t in (1..=(6 * n as u64)).rev() {
            let tail = (head + n - 1) % n;

            // B = AES-1(K, (A ^ t) | R[n-1])
            xor_counter(&mut a, t);
            block[..KW_SEMIBLOCK_SIZE].copy_from_slice(&a);
            block[KW_SEMIBLOCK_SIZE..].copy_from_slice(&regs[tail]);
            cipher.decrypt_block(&mut block)?;

            // A = MSB(64, B)
            a.copy_from_slice(&block[..KW_SEMIBLOCK_SIZE]);

            // Shift right; R[0] = LSB(64, B)
            regs[tail].copy_from_slice(&block[KW_SEMIBLOCK_SIZE..]);
            head = tail;
        }
        debug_assert_eq!(head, 0);

        let valid = openssl::memcmp::eq(&a, &self.iv);
        a.zeroize();
        if !valid {
            tracing::error!("Key unwrap integrity check failed");
            Err(CryptoError::KwIntegrityCheckFailed)?
        }

        let mut plain = Zeroizing::new(Vec::with_capacity(n * KW_SEMIBLOCK_SIZE));
        for reg in regs.iter() {
            plain.extend_from_slice(reg);
        }

        Ok(plain)
    }
}

fn load_registers(bytes: &[u8]) -> Zeroizing<Vec<Val64>> {
    Zeroizing::new(
        bytes
            .chunks_exact(KW_SEMIBLOCK_SIZE)
            .map(|chunk| {
                let mut reg = [0u8; KW_SEMIBLOCK_SIZE];
                reg.copy_from_slice(chunk);
                reg
            })
            .collect(),
    )
}

/// XORs the big-endian encoding of `t` into `val`.
fn xor_counter(val: &mut Val64, t: u64) {
    for (x, y) in val.iter_mut().zip(t.to_be_bytes()) {
        *x ^= y;
    }
}
