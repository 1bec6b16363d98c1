use anyhow::Result;
use clap::Parser;
use coffer::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    coffer::logging::init(cli.verbose);
    cli.run().await
}
