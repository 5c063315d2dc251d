use scheduling_infra::run_migration;

/// This is a standalone binary that can be run to apply the migrations.
/// Kept deliberately separate from the main `init_subscriber` (which needs
/// the OTLP pipeline); a one-shot migration run only needs plain output.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    run_migration().await.inspect_err(|e| {
        tracing::error!(error = ?e, "Failed to run migrations");
    })?;

    tracing::info!("Migrations complete");

    Ok(())
}
