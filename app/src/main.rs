use anyhow::Context as _;
use clap::Parser;

use args::Args;

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.apply(config::load().context("failed to load configuration")?);

    server::init_logger(&config.log_filter);
    log::info!("llm-openai-proxy {}", env!("CARGO_PKG_VERSION"));

    let listen_address = format!("0.0.0.0:{}", config.port)
        .parse()
        .context("invalid listen address")?;

    server::serve(server::ServeConfig { listen_address, config }).await
}
