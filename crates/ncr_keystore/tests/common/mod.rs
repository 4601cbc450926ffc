// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(dead_code)]

use ncr_keystore::*;

pub const DEFAULT_WRAP_ALGORITHM: u32 = WrapAlgorithm::AesRfc3394 as u32;

/// Runs `test` against a freshly opened device and checks that the test
/// left no objects behind.
pub fn device_test<F>(config: Option<NcrConfig>, test: F)
where
    F: FnOnce(&NcrDevice),
{
    let device = match config {
        Some(config) => NcrDevice::with_config(config).expect("failed to open device"),
        None => NcrDevice::new(),
    };

    test(&device);

    assert_eq!(device.data_count(), 0, "test leaked data objects");
    assert_eq!(device.key_count(), 0, "test leaked key objects");
}

pub fn exportable_data() -> DataFlags {
    DataFlags::new().with_exportable(true)
}

pub fn helper_data_init(device: &NcrDevice, max_object_size: usize, initial: &[u8]) -> Descriptor {
    device
        .data_init(&DataInitReq {
            max_object_size,
            flags: exportable_data(),
            initial,
        })
        .expect("data_init failed")
}

pub fn helper_data_read(device: &NcrDevice, desc: Descriptor) -> Vec<u8> {
    let mut out = Vec::new();
    device
        .data_get(desc, &mut out, usize::MAX, false)
        .expect("data_get failed");
    out
}

/// Imports `material` as an AES-CBC secret key through a temporary data object.
pub fn helper_import_key(device: &NcrDevice, material: &[u8], flags: KeyFlags) -> Descriptor {
    let data = helper_data_init(device, material.len().max(1), material);
    let key = device.key_init().expect("key_init failed");

    device
        .key_import(&KeyImportReq {
            key,
            data,
            key_type: KeyType::Secret,
            algorithm: Algorithm::AesCbc,
            flags,
            key_id: b"ab",
        })
        .expect("key_import failed");

    device.data_deinit(data).expect("data_deinit failed");
    key
}

pub fn helper_wrap(device: &NcrDevice, key: Descriptor, kek: Descriptor, data: Descriptor) -> Result<(), NcrError> {
    device.key_wrap(&KeyWrapReq {
        key,
        kek,
        data,
        algorithm: DEFAULT_WRAP_ALGORITHM,
        iv: None,
    })
}

pub fn helper_unwrap(device: &NcrDevice, key: Descriptor, kek: Descriptor, data: Descriptor) -> Result<(), NcrError> {
    device.key_unwrap(&KeyWrapReq {
        key,
        kek,
        data,
        algorithm: DEFAULT_WRAP_ALGORITHM,
        iv: None,
    })
}

/// Exports a key through a temporary data object and returns its bytes.
pub fn helper_export(device: &NcrDevice, key: Descriptor) -> Result<Vec<u8>, NcrError> {
    let data = helper_data_init(device, device.config().max_key_size(), b"");
    let result = device
        .key_export(key, data)
        .map(|_| helper_data_read(device, data));
    device.data_deinit(data).expect("data_deinit failed");
    result
}

pub fn helper_deinit_keys(device: &NcrDevice, keys: &[Descriptor]) {
    for key in keys {
        device.key_deinit(*key).expect("key_deinit failed");
    }
}
