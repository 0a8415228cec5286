mod run_activity;
mod run_sim;

use run_activity::*;
use run_sim::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lupin", version, about, long_about)]
/// Regulator activity from ridge regression of expression shifts on
/// binary signatures
struct Cli {
    /// show progress messages
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Estimate group-level regulator activities
    Run(ActivityArgs),

    /// Simulate expression, offset, signature and design tables
    Simulate(SimArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::Run(args) => {
            run_activity(args)?;
        }
        Commands::Simulate(args) => {
            run_sim_activity_data(args)?;
        }
    }

    Ok(())
}

pub(crate) fn write_parameters(param_file: &str, params: &serde_json::Value) -> anyhow::Result<()> {
    matrix_util::common_io::mkdir(param_file)?;
    std::fs::write(param_file, serde_json::to_string_pretty(params)?)?;
    Ok(())
}
