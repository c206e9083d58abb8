use anyhow::Context;

use so_vits_svc_server::{logger, server, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init_logger();

    let config = ServiceConfig::load().context("failed to load configuration")?;
    log::info!(
        "Starting so-vits-svc server (architecture root {}, models {})",
        config.architecture_root().display(),
        config.models_dir.display()
    );

    server::serve(config).await.context("server terminated unexpectedly")
}
