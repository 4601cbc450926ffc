// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Module for Rand.

use super::CryptoError;

/// Fills `buf` with cryptographically strong random bytes.
///
/// # Errors
/// * `CryptoError::RngError` - If the RNG operation fails.
pub fn rand_bytes(buf: &mut [u8]) -> Result<(), CryptoError> {
    openssl::rand::rand_bytes(buf).map_err(|e| {
        tracing::error!(?e, "Random number generation failed");
        CryptoError::RngError
    })
}

#[cfg(test)]
mod tests {
    use test_with_tracing::test;

    use super::*;

    #[test]
    fn test_rand_bytes_fills_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        rand_bytes(&mut a).expect("rand_bytes failed");
        rand_bytes(&mut b).expect("rand_bytes failed");

        assert_ne!(a, [0u8; 32]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_rand_bytes_empty() {
        let mut empty = [0u8; 0];
        assert!(rand_bytes(&mut empty).is_ok());
    }
}
