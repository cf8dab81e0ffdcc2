//! secgroup_sync CLI
//!
//! This binary turns spreadsheet firewall rules into security-group changes, or into a
//! shell script that performs them.
//!
//! # Example
//! ```sh
//! secgroup_sync apply --source rules.xlsx --vpc-id vpc-0123abcd --group-name web
//! secgroup_sync script --config target.yaml --output deploy_sg.sh
//! ```

use std::process;

use clap::Parser;
use secgroup_sync::{run, Args};
use tracing::{error, Level};

/// Entry point for the secgroup_sync CLI.
fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(if args.quiet { Level::WARN } else { Level::INFO })
        .init();

    if let Err(e) = run(args) {
        error!("{}", e);
        process::exit(e.exit_code());
    }
}
