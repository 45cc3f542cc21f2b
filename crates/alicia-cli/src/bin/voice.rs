//! Standalone voice binary: intent router over the bus.

use std::path::PathBuf;

use alicia_cli::topology::Role;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "alicia-voice", about = "Alicia voice intent router")]
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
    let code = alicia_cli::topology::run(config, vec![Role::Voice], args.snapshot_path).await;
    std::process::exit(code);
}
