//! Standalone balancer binary: health-probes one target service's instance
//! pool, refreshed from the registry's HTTP API.

use std::path::PathBuf;

use alicia_cli::topology::Role;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "alicia-balancer", about = "Alicia load balancer health prober")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "./registry-snapshot.json")]
    snapshot_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = alicia_cli::bootstrap("ALICIA", args.config);
    let code = alicia_cli::topology::run(config, vec![Role::Balancer], args.snapshot_path).await;
    std::process::exit(code);
}
