use anyhow::Result;
use clap::Parser;

use metadata_harvester::cli::{Cli, Commands};
use metadata_harvester::commands::{run_dedup, run_enqueue, run_worker};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            run_worker(args)?;
        }
        Commands::Dedup(args) => {
            run_dedup(args)?;
        }
        Commands::Enqueue(args) => {
            run_enqueue(args)?;
        }
    }

    Ok(())
}
