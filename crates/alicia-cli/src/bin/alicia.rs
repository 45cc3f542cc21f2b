//! Combined launcher: runs any subset of the substrate's services in one
//! process, sharing a single broker connection per the resource model.
//!
//! ```text
//! alicia --role gateway --role registry --config ./config.yaml
//! alicia --role all
//! ```

use std::path::PathBuf;

use alicia_cli::topology::Role;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "alicia", about = "Alicia service-bus substrate launcher")]
struct Args {
    /// Role to run; repeat to run several in this process. Defaults to `all`.
    #[arg(long = "role")]
    roles: Vec<Role>,

    /// Path to config.yaml (overrides ALICIA_CONFIG and ./config.yaml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the registry's snapshot file.
    #[arg(long, default_value = "./registry-snapshot.json")]
    snapshot_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = alicia_cli::bootstrap("ALICIA", args.config);

    let roles = if args.roles.is_empty() { vec![Role::All] } else { args.roles };

    let code = alicia_cli::topology::run(config, roles, args.snapshot_path).await;
    std::process::exit(code);
}
