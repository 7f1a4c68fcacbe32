//! Padlink host relay entry point.
//!
//! Wires configuration, logging, and the UDP relay together and runs the
//! event loop until ctrl-c.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()        -- TOML from the platform config dir
//!  └─ tracing init         -- RUST_LOG overrides the configured level
//!  └─ Relay::bind()        -- UDP socket + SlotManager + channels
//!  └─ relay.run()          -- single-task select! loop:
//!       ├─ inbound datagrams  → decode → SlotManager
//!       ├─ outbound channel   → socket
//!       ├─ refresh tick       → surface frame pushes
//!       └─ ctrl-c             → teardown every slot, flush, exit
//! ```

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use padlink_host::config;
use padlink_host::relay::Relay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so its log level can seed the filter; a
    // missing file is a normal first run.
    let cfg = config::load_config()?;

    // Initialise structured logging.  `RUST_LOG` takes precedence over the
    // configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.host.log_level.clone())),
        )
        .init();

    info!("Padlink host starting");

    // Write the default file on first run so users have something to edit.
    match config::config_file_path() {
        Ok(path) if !path.exists() => {
            if let Err(e) = config::save_config(&cfg) {
                warn!("could not write default config: {e}");
            } else {
                info!("wrote default config to {}", path.display());
            }
        }
        Ok(_) => {}
        Err(e) => warn!("no platform config directory: {e}"),
    }

    let relay = Relay::bind(&cfg).await?;
    info!("Padlink host ready.  Press Ctrl-C to exit.");
    relay.run().await?;

    info!("Padlink host stopped");
    Ok(())
}
