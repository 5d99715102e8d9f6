use clap::Parser;
use papertrader::interfaces::cli::Cli;
use tracing::Level;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    if let Err(error) = papertrader::interfaces::cli::run(cli).await {
        tracing::error!(%error, "fatal error");
        std::process::exit(1);
    }
    Ok(())
}
