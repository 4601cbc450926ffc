// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key and data object store with RFC 3394 key wrapping.
//!
//! Callers hold [`Descriptor`]s, never objects. Key material enters through a
//! data object (import) or the RNG (generate), and leaves only through an
//! export gated by the key's flags or as an RFC 3394 wrapped blob. Keys
//! recovered by unwrap can be wrapped again but never exported.
//!
//! ```no_run
//! use ncr_keystore::*;
//!
//! # fn main() -> Result<(), NcrError> {
//! let device = NcrDevice::new();
//!
//! let kek = device.key_init()?;
//! device.key_generate(&KeyGenerateReq {
//!     key: kek,
//!     algorithm: Algorithm::AesEcb,
//!     flags: KeyFlags::new(),
//!     bits: 128,
//! })?;
//!
//! let key = device.key_init()?;
//! device.key_generate(&KeyGenerateReq {
//!     key,
//!     algorithm: Algorithm::AesCbc,
//!     flags: KeyFlags::new().with_wrappable(true),
//!     bits: 256,
//! })?;
//!
//! let blob = device.data_init(&DataInitReq {
//!     max_object_size: 64,
//!     flags: DataFlags::new(),
//!     initial: &[],
//! })?;
//! device.key_wrap(&KeyWrapReq {
//!     key,
//!     kek,
//!     data: blob,
//!     algorithm: WrapAlgorithm::AesRfc3394 as u32,
//!     iv: None,
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod config;
pub mod crypto;
pub mod data;
pub mod device;
pub mod errors;
pub mod key;
pub mod key_wrap;
pub mod table;

pub use config::NcrConfig;
pub use data::DataFlags;
pub use device::DataInitReq;
pub use device::KeyGenerateReq;
pub use device::KeyImportReq;
pub use device::KeyWrapReq;
pub use device::NcrDevice;
pub use errors::NcrError;
pub use key::Algorithm;
pub use key::KeyFlags;
pub use key::KeyInfo;
pub use key::KeyType;
pub use key::MAX_KEY_ID_SIZE;
pub use key_wrap::WrapAlgorithm;
pub use table::Descriptor;
