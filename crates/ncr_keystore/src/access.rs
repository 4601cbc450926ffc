// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Flag translation between key and data objects.
//!
//! Material crossing from a key into a data object (export, wrap) or back
//! (import, unwrap) carries its exportability with it. These helpers are the
//! only place where that translation happens.

use crate::data::DataFlags;
use crate::key::KeyFlags;

/// Data flags for bytes derived from a key with `flags`.
pub fn key_flags_to_data(flags: KeyFlags) -> DataFlags {
    DataFlags::new().with_exportable(flags.exportable())
}

/// Key flags for material read from a data object with `flags`.
pub fn data_flags_to_key(flags: DataFlags) -> KeyFlags {
    KeyFlags::new().with_exportable(flags.exportable())
}

/// Flags of the data object receiving a wrapped blob.
///
/// The blob is always readable: the wrapping is itself the protection.
pub fn wrapped_data_flags(wrapped: KeyFlags) -> DataFlags {
    key_flags_to_data(wrapped).with_exportable(true)
}

/// Flags of a key produced by unwrap.
///
/// Unwrapped keys may be wrapped again but never exported in the clear,
/// whatever the source object said.
pub fn unwrapped_key_flags(source: DataFlags) -> KeyFlags {
    data_flags_to_key(source)
        .with_exportable(false)
        .with_wrappable(true)
}

/// Flags of a key imported from a data object.
///
/// Material coming from a non-exportable object cannot become exportable by
/// passing through a key.
pub fn imported_key_flags(requested: KeyFlags, source: DataFlags) -> KeyFlags {
    if source.exportable() {
        requested
    } else {
        requested.with_exportable(false)
    }
}
