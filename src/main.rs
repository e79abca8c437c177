//! Thin demonstration shell: accepts `-h/--help` and `--version` only, then
//! runs the bundled hello-world producer/consumer network (the scenario in
//! `SPEC_FULL.md` §8.1) to completion. Describing arbitrary user networks
//! from the command line is explicitly out of scope; that remains a
//! library-only concern.

use std::time::Duration;

use clap::Parser;
use fluxgraph::{ make_consumer, make_producer, spin, Network };
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Run the fluxgraph hello-world demo network", long_about = None)]
struct Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run_demo())
}

async fn run_demo() -> anyhow::Result<()> {
    let mut network = Network::default();
    network.cancel_after(Duration::from_millis(1));

    network.push(make_producer::<String, _>("hello_world", || "Hello World".to_string()))?;
    network.push(
        make_consumer::<String, _>("hello_world", |line: &String| {
            tracing::info!(%line, "received");
        })
    )?;

    spin(network).await?;
    Ok(())
}
