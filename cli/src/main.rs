//! `permit-log` entry point.

use clap::Parser;
use permit_log_cli::PermitLogCli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    permit_log_cli::init_tracing();

    let cli = PermitLogCli::parse();
    tracing::debug!("permit-log v{} starting", env!("CARGO_PKG_VERSION"));
    cli.run().await
}
