// SPDX-License-Identifier: MIT

//! `tracing-subscriber` initialization: an `EnvFilter` (defaulting to
//! `info`) plus a `fmt` layer, switchable between human-readable and JSON
//! output.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
