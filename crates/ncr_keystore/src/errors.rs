// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Errors reported by key store operations.

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors reported by key store operations.
///
/// Every operation either fully succeeds or returns one of these without
/// modifying the target object.
#[derive(Error, Debug, PartialEq, Eq, Copy, Clone)]
pub enum NcrError {
    /// The argument is invalid.
    #[error("invalid argument")]
    InvalidArgument,

    /// A length is not acceptable for the operation, e.g. key material that
    /// is not a multiple of the wrap register size.
    #[error("invalid length")]
    InvalidLength,

    /// The key has the wrong type for the operation.
    #[error("invalid key type")]
    InvalidKeyType,

    /// The descriptor does not name a live object.
    #[error("object not found")]
    NotFound,

    /// The object's flags forbid the operation.
    #[error("permission denied")]
    PermissionDenied,

    /// The destination object cannot hold the result.
    #[error("buffer too small")]
    BufferTooSmall,

    /// The integrity register did not match after unwrapping.
    /// Either the KEK, the algorithm or the wrapped bytes are wrong.
    #[error("integrity check failed")]
    IntegrityCheckFailed,

    /// The algorithm or key type is not supported.
    #[error("unsupported algorithm")]
    Unsupported,

    /// The maximum number of objects in the table has been reached.
    #[error("reached maximum number of objects")]
    ReachedMaxObjects,

    /// Storage for the object could not be allocated.
    #[error("out of memory")]
    OutOfMemory,

    /// Failure reported by the block cipher capability.
    #[error(transparent)]
    Crypto(CryptoError),
}

impl From<CryptoError> for NcrError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KwInvalidInputSize => NcrError::InvalidLength,
            CryptoError::KwIntegrityCheckFailed => NcrError::IntegrityCheckFailed,
            _ => NcrError::Crypto(e),
        }
    }
}
