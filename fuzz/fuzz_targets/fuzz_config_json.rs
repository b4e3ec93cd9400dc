//! Fuzz target: `KmmsConfig::from_json` and path resolution
//!
//! Feeds arbitrary bytes through the configuration loader and, when a
//! document validates, through path resolution. Invariants checked:
//! - No panics under any byte sequence
//! - A validated config either resolves or fails with a config error
//! - Every resolved path is non-empty and holds unique item names
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use std::collections::BTreeSet;

use kmms::Error;
use kmms::config::KmmsConfig;
use kmms::path::{DeviceTable, PathSet};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = KmmsConfig::from_json(text) else {
        return;
    };

    match PathSet::build(&config, &DeviceTable::from_config(&config)) {
        Ok(paths) => {
            for name in paths.names() {
                let path = paths.get(name).unwrap();
                assert!(!path.is_empty(), "resolved path '{name}' is empty");
                let unique: BTreeSet<&str> = path.items().iter().map(|i| i.name()).collect();
                assert_eq!(unique.len(), path.len(), "duplicate items in '{name}'");
            }
        }
        Err(e) => assert!(matches!(e, Error::Config(_)), "unexpected error kind: {e}"),
    }
});
