use clap::Parser;

use branch_cli::{run_cli_config, CliConfig};

/// Entry-point for the main "branch" command-line executable
fn main() {
    let cfg = CliConfig::parse();
    run_cli_config(cfg);
}
