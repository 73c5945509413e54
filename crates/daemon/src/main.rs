// SPDX-License-Identifier: MIT

//! `amelia-server`: starts the daemon, waits for a shutdown signal, then
//! drains gracefully.

use std::path::PathBuf;

use ame_daemon::{signal, Config, Daemon};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("AMELIA_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    ame_daemon::logging::init(config.log_format);

    let daemon = Daemon::start(config).await?;

    signal::shutdown_signal().await;

    daemon.shutdown().await?;
    Ok(())
}
