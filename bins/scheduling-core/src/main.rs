mod backtrace;
mod telemetry;

use scheduling_infra::setup_context;
use scheduling_utils::config::APP_CONFIG;
use telemetry::init_subscriber;
use tokio::{runtime::Builder, signal};
use tracing::{error, info};

/// Scheduling core has no HTTP surface of its own -- routing, auth, and
/// rate limiting live in the surrounding layer. This binary's job is
/// limited to bootstrapping the shared `AppContext` -- Postgres pool,
/// Redis-backed slot lock, queues -- that an embedding HTTP process (or a
/// test harness) would otherwise have to assemble by hand. Migrations are
/// applied by the separate `migrate` binary (`src/bin/migrate.rs`), not
/// here.
fn main() -> anyhow::Result<()> {
    init_subscriber()?;
    backtrace::install_custom_panic_hook();

    let runtime_mode = &APP_CONFIG.tokio_runtime;
    let runtime = if runtime_mode == "current_thread" {
        info!("Using single-threaded Tokio runtime.");
        Builder::new_current_thread().enable_all().build()?
    } else if runtime_mode == "multi_thread" {
        info!("Using multi-threaded Tokio runtime.");
        Builder::new_multi_thread().enable_all().build()?
    } else {
        error!(
            "Invalid value for `tokio_runtime` in the configuration: {} - defaulting to `multi_thread`",
            runtime_mode
        );
        Builder::new_multi_thread().enable_all().build()?
    };

    runtime.block_on(async_main())?;

    Ok(())
}

async fn async_main() -> anyhow::Result<()> {
    let _context = setup_context().await?;
    info!("Scheduling core context initialized (repos, slot lock, queues wired up)");

    signal::ctrl_c().await?;
    info!("[shutdown] received SIGINT, shutting down");

    Ok(())
}
