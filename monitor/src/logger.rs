// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Once;

use env_logger::Builder;
use log::LevelFilter;

static INIT: Once = Once::new();

/// Info by default, overridable through `RUST_LOG`.
pub fn initialize_logger() {
    INIT.call_once_force(|_| {
        let mut builder = Builder::new();
        builder
            .filter_level(LevelFilter::Info)
            .filter_module("hyper", LevelFilter::Warn)
            .filter_module("tungstenite", LevelFilter::Warn)
            .format_timestamp_millis()
            .parse_default_env();
        let _ = builder.try_init();
    });
}
