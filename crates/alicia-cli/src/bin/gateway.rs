//! Standalone gateway binary: admission/auth API only.

use std::path::PathBuf;

use alicia_cli::topology::Role;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "alicia-gateway", about = "Alicia admission gateway")]
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
    let code = alicia_cli::topology::run(config, vec![Role::Gateway], args.snapshot_path).await;
    std::process::exit(code);
}
