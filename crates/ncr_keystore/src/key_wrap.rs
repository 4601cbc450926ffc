// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wrap and unwrap of key objects.
//!
//! Objects are only read through short lived guards and everything the cipher
//! needs is copied into zeroizing scratch buffers first. The target object is
//! written once, after the transform has succeeded, so a failed request leaves
//! it untouched and a key may serve as both KEK and subject.

use tracing::instrument;
use zeroize::Zeroizing;

use crate::access::unwrapped_key_flags;
use crate::access::wrapped_data_flags;
use crate::crypto::aes::AesEcb;
use crate::crypto::kw::AesKeyWrap;
use crate::crypto::kw::KW_SEMIBLOCK_SIZE;
use crate::data::DataItem;
use crate::errors::NcrError;
use crate::key::KeyItem;
use crate::key::KeyType;
use crate::table::Entry;

/// Key wrapping algorithm.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WrapAlgorithm {
    /// AES Key Wrap, RFC 3394.
    AesRfc3394 = 0,
}

impl TryFrom<u32> for WrapAlgorithm {
    type Error = NcrError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            x if x == WrapAlgorithm::AesRfc3394 as u32 => Ok(WrapAlgorithm::AesRfc3394),
            _ => {
                tracing::error!(error = ?NcrError::Unsupported, algorithm = value, "Unknown wrap algorithm");
                Err(NcrError::Unsupported)
            }
        }
    }
}

/// Copies the KEK secret out of its object.
fn kek_secret(kek: &Entry<KeyItem>) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(kek.read().secret().to_vec())
}

/// Wraps the secret of `to_wrap` under `kek` into `output`.
///
/// # Errors
/// * `NcrError::PermissionDenied` - If `to_wrap` is not wrappable.
/// * `NcrError::InvalidKeyType` - If `to_wrap` is not a secret key.
/// * `NcrError::Unsupported` - If `algorithm` is unknown.
/// * `NcrError::InvalidLength` - If the secret is empty or not a multiple of 8 bytes.
/// * `NcrError::BufferTooSmall` - If `output` cannot hold the wrapped blob.
/// * `NcrError::Crypto` - If the KEK is not a valid AES key.
#[instrument(skip_all)]
pub(crate) fn wrap_key(
    to_wrap: &Entry<KeyItem>,
    kek: &Entry<KeyItem>,
    output: &Entry<DataItem>,
    algorithm: u32,
    iv: Option<&[u8]>,
) -> Result<(), NcrError> {
    let (secret, flags) = {
        let key = to_wrap.read();

        if !key.flags().wrappable() {
            tracing::error!(error = ?NcrError::PermissionDenied, "Key is not wrappable");
            Err(NcrError::PermissionDenied)?
        }

        if key.key_type() != KeyType::Secret {
            tracing::error!(error = ?NcrError::InvalidKeyType, key_type = ?key.key_type(), "Only secret keys can be wrapped");
            Err(NcrError::InvalidKeyType)?
        }

        (Zeroizing::new(key.secret().to_vec()), key.flags())
    };

    match WrapAlgorithm::try_from(algorithm)? {
        WrapAlgorithm::AesRfc3394 => {
            let mut cipher = AesEcb::new(&kek_secret(kek))?;
            let wrapped = AesKeyWrap::with_iv(iv).wrap(&mut cipher, &secret)?;

            output
                .write()
                .replace(&wrapped, wrapped_data_flags(flags))
                .inspect_err(|_| {
                    tracing::error!(size = wrapped.len(), "Output data object cannot hold wrapped key");
                })?;
        }
    }

    tracing::debug!(size = secret.len(), "Key wrapped");
    Ok(())
}

/// Unwraps the blob held by `input` under `kek` into `output`.
///
/// # Errors
/// * `NcrError::Unsupported` - If `algorithm` is unknown.
/// * `NcrError::InvalidLength` - If the blob is not a multiple of 8 bytes or shorter than 16.
/// * `NcrError::BufferTooSmall` - If `output` cannot hold the unwrapped secret.
/// * `NcrError::IntegrityCheckFailed` - If the KEK, IV or blob is wrong.
/// * `NcrError::Crypto` - If the KEK is not a valid AES key.
#[instrument(skip_all)]
pub(crate) fn unwrap_key(
    output: &Entry<KeyItem>,
    kek: &Entry<KeyItem>,
    input: &Entry<DataItem>,
    algorithm: u32,
    iv: Option<&[u8]>,
) -> Result<(), NcrError> {
    let algorithm = WrapAlgorithm::try_from(algorithm)?;

    let (wrapped, source_flags) = {
        let data = input.read();
        (data.contents().to_vec(), data.flags())
    };

    if wrapped.len() < 2 * KW_SEMIBLOCK_SIZE || wrapped.len() % KW_SEMIBLOCK_SIZE != 0 {
        tracing::error!(error = ?NcrError::InvalidLength, len = wrapped.len(), "Wrapped key has invalid length");
        Err(NcrError::InvalidLength)?
    }

    let n = wrapped.len() / KW_SEMIBLOCK_SIZE - 1;
    let max_size = output.read().max_size();
    if n * KW_SEMIBLOCK_SIZE > max_size {
        tracing::error!(error = ?NcrError::BufferTooSmall, n, max_size, "Unwrapped key would not fit");
        Err(NcrError::BufferTooSmall)?
    }

    let plain = match algorithm {
        WrapAlgorithm::AesRfc3394 => {
            let mut cipher = AesEcb::new(&kek_secret(kek))?;
            AesKeyWrap::with_iv(iv).unwrap(&mut cipher, &wrapped)?
        }
    };

    output
        .write()
        .set_unwrapped(&plain, unwrapped_key_flags(source_flags))?;

    tracing::debug!(size = plain.len(), "Key unwrapped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_with_tracing::test;

    use super::*;
    use crate::data::DataFlags;
    use crate::key::Algorithm;
    use crate::key::KeyFlags;
    use crate::table::Table;

    struct Fixture {
        keys: Table<KeyItem>,
        data: Table<DataItem>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                keys: Table::new(8),
                data: Table::new(8),
            }
        }

        fn key(&self, material: &[u8], flags: KeyFlags) -> Entry<KeyItem> {
            let mut item = KeyItem::new(64);
            if !material.is_empty() {
                item.import(material, KeyType::Secret, Algorithm::AesEcb, flags, b"")
                    .expect("import failed");
            }
            let desc = self.keys.insert(item).expect("insert failed");
            self.keys.get(desc).expect("get failed")
        }

        fn data(&self, max_size: usize, initial: &[u8]) -> Entry<DataItem> {
            let item = DataItem::new(max_size, DataFlags::new(), initial).expect("new failed");
            let desc = self.data.insert(item).expect("insert failed");
            self.data.get(desc).expect("get failed")
        }
    }

    fn wrappable() -> KeyFlags {
        KeyFlags::new().with_wrappable(true)
    }

    #[test]
    fn test_wrap_algorithm_from_u32() {
        assert_eq!(WrapAlgorithm::try_from(0), Ok(WrapAlgorithm::AesRfc3394));
        assert_eq!(WrapAlgorithm::try_from(1), Err(NcrError::Unsupported));
    }

    #[test]
    fn test_wrap_known_answer() {
        let fx = Fixture::new();
        let kek = fx.key(
            &hex::decode("000102030405060708090A0B0C0D0E0F").expect("bad hex"),
            KeyFlags::new(),
        );
        let key = fx.key(
            &hex::decode("00112233445566778899AABBCCDDEEFF").expect("bad hex"),
            wrappable(),
        );
        let out = fx.data(64, b"");

        wrap_key(&key, &kek, &out, 0, None).expect("wrap failed");

        let out = out.read();
        assert_eq!(
            out.contents(),
            hex::decode("1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5")
                .expect("bad hex")
                .as_slice()
        );
        assert!(out.flags().exportable());
    }

    #[test]
    fn test_wrap_requires_wrappable() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());
        let key = fx.key(&[2; 16], KeyFlags::new().with_exportable(true));
        let out = fx.data(64, b"old");

        assert_eq!(wrap_key(&key, &kek, &out, 0, None), Err(NcrError::PermissionDenied));
        assert_eq!(out.read().contents(), b"old");
    }

    #[test]
    fn test_wrap_requires_secret_key() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());
        let empty = fx.key(&[], KeyFlags::new());
        empty.write().set_flags(wrappable());

        assert_eq!(
            wrap_key(&empty, &kek, &fx.data(64, b""), 0, None),
            Err(NcrError::InvalidKeyType)
        );
    }

    #[test]
    fn test_wrap_unknown_algorithm() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());
        let key = fx.key(&[2; 16], wrappable());
        let out = fx.data(64, b"");

        assert_eq!(wrap_key(&key, &kek, &out, 7, None), Err(NcrError::Unsupported));
        assert_eq!(out.read().size(), 0);
    }

    #[test]
    fn test_wrap_invalid_length() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());
        let key = fx.key(&[2; 12], wrappable());

        assert_eq!(
            wrap_key(&key, &kek, &fx.data(64, b""), 0, None),
            Err(NcrError::InvalidLength)
        );
    }

    #[test]
    fn test_wrap_output_too_small() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());
        let key = fx.key(&[2; 16], wrappable());
        let out = fx.data(23, b"old");

        assert_eq!(wrap_key(&key, &kek, &out, 0, None), Err(NcrError::BufferTooSmall));
        assert_eq!(out.read().contents(), b"old");
        assert!(!out.read().flags().exportable());

        let out = fx.data(24, b"");
        assert!(wrap_key(&key, &kek, &out, 0, None).is_ok());
    }

    #[test]
    fn test_wrap_bad_kek_length() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 20], KeyFlags::new());
        let key = fx.key(&[2; 16], wrappable());

        assert_eq!(
            wrap_key(&key, &kek, &fx.data(64, b""), 0, None),
            Err(NcrError::Crypto(crate::crypto::CryptoError::AesInvalidKeySize))
        );
    }

    #[test]
    fn test_wrap_self() {
        let fx = Fixture::new();
        let key = fx.key(&[5; 16], wrappable());
        let out = fx.data(64, b"");

        wrap_key(&key, &key, &out, 0, None).expect("wrap failed");
        assert_eq!(out.read().size(), 24);
    }

    #[test]
    fn test_unwrap_round_trip() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 32], KeyFlags::new());
        let material: Vec<u8> = (0..32u8).collect();
        let key = fx.key(&material, wrappable().with_exportable(true));
        let blob = fx.data(64, b"");
        wrap_key(&key, &kek, &blob, 0, None).expect("wrap failed");

        let dest = fx.key(&[], KeyFlags::new());
        unwrap_key(&dest, &kek, &blob, 0, None).expect("unwrap failed");

        let dest = dest.read();
        assert_eq!(dest.secret(), material.as_slice());
        assert_eq!(dest.key_type(), KeyType::Secret);
        assert!(!dest.flags().exportable());
        assert!(dest.flags().wrappable());
    }

    #[test]
    fn test_unwrap_into_kek() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], wrappable());
        let key = fx.key(&[2; 16], wrappable());
        let blob = fx.data(64, b"");
        wrap_key(&key, &kek, &blob, 0, None).expect("wrap failed");

        unwrap_key(&kek, &kek, &blob, 0, None).expect("unwrap failed");
        assert_eq!(kek.read().secret(), &[2; 16]);
    }

    #[test]
    fn test_unwrap_invalid_lengths() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());
        let dest = fx.key(&[], KeyFlags::new());

        for len in [0usize, 8, 12, 17, 30] {
            let blob = fx.data(64, &vec![0u8; len]);
            assert_eq!(
                unwrap_key(&dest, &kek, &blob, 0, None),
                Err(NcrError::InvalidLength),
                "len {len}"
            );
        }
    }

    #[test]
    fn test_unwrap_capacity_uses_full_register_count() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());

        // n * 8 = 72 exceeds a 64 byte key even though (n - 1) * 8 fits.
        let blob = fx.data(128, &[0u8; 80]);
        let dest = fx.key(&[], KeyFlags::new());
        assert_eq!(
            unwrap_key(&dest, &kek, &blob, 0, None),
            Err(NcrError::BufferTooSmall)
        );
        assert_eq!(dest.read().key_type(), KeyType::Invalid);
    }

    #[test]
    fn test_unwrap_tampered() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());
        let key = fx.key(&[2; 16], wrappable());
        let blob = fx.data(64, b"");
        wrap_key(&key, &kek, &blob, 0, None).expect("wrap failed");

        let mut bytes = blob.read().contents().to_vec();
        bytes[10] ^= 0x01;
        let tampered = fx.data(64, &bytes);

        let dest = fx.key(&[9; 16], KeyFlags::new().with_exportable(true));
        assert_eq!(
            unwrap_key(&dest, &kek, &tampered, 0, None),
            Err(NcrError::IntegrityCheckFailed)
        );
        assert_eq!(dest.read().secret(), &[9; 16]);
        assert!(dest.read().flags().exportable());
    }

    #[test]
    fn test_unwrap_unknown_algorithm() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());
        let dest = fx.key(&[], KeyFlags::new());
        let blob = fx.data(64, &[0u8; 24]);

        assert_eq!(
            unwrap_key(&dest, &kek, &blob, 1, None),
            Err(NcrError::Unsupported)
        );
    }

    #[test]
    fn test_custom_iv_must_match() {
        let fx = Fixture::new();
        let kek = fx.key(&[1; 16], KeyFlags::new());
        let key = fx.key(&[2; 16], wrappable());
        let blob = fx.data(64, b"");
        let iv = [0x11u8; 8];
        wrap_key(&key, &kek, &blob, 0, Some(&iv)).expect("wrap failed");

        let dest = fx.key(&[], KeyFlags::new());
        assert_eq!(
            unwrap_key(&dest, &kek, &blob, 0, None),
            Err(NcrError::IntegrityCheckFailed)
        );
        unwrap_key(&dest, &kek, &blob, 0, Some(&iv)).expect("unwrap failed");
        assert_eq!(dest.read().secret(), &[2; 16]);

        // Short IVs fall back to the default.
        let default_blob = fx.data(64, b"");
        wrap_key(&key, &kek, &default_blob, 0, Some(&[1, 2, 3])).expect("wrap failed");
        unwrap_key(&dest, &kek, &default_blob, 0, None).expect("unwrap failed");
    }
}
