mod cast;
mod combinelogs;
mod common;
mod convert;
mod filenames;
mod imageprofiles;
mod logging;
mod process;
mod query;
mod rpn;
mod scan;
mod sort;
mod split;

use clap::Parser;
use sdds_error::{PrintErrors, print_errors};

use crate::cast::exec_cast;
use crate::combinelogs::exec_combinelogfiles;
use crate::convert::exec_convert;
use crate::imageprofiles::exec_imageprofiles;
use crate::logging::{default_env_filter, setup_logger};
use crate::process::exec_process;
use crate::query::exec_query;
use crate::rpn::exec_rpn;
use crate::sort::exec_sort;
use crate::split::exec_split;

#[derive(clap::Parser)]
#[command(version, about = "Utilities for Self Describing Data Sets")]
struct Cli {
    /// Log what the utilities do to standard error.
    #[arg(long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

/// Arguments in the `-option=item,item` convention, handed to the utility unchanged.
#[derive(Debug, clap::Args)]
struct Arguments {
    #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Copy a dataset, changing its encoding and selecting pages and definitions.
    Convert(Arguments),
    /// Sort rows by columns or by Pareto rank, and pages by parameters.
    Sort(Arguments),
    /// Write each page of a dataset to a file of its own.
    Split(Arguments),
    /// Change the numeric type of columns, parameters or arrays.
    Cast(Arguments),
    /// Define columns and parameters and filter rows with RPN expressions.
    Process(Arguments),
    /// Describe the layout of datasets.
    Query(Arguments),
    /// Evaluate RPN expressions.
    Rpn(Arguments),
    /// Merge one-channel data logger files on the times they share.
    Combinelogfiles(Arguments),
    /// Reduce an image stored one line per column to a profile.
    Imageprofiles(Arguments),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logger(default_env_filter(cli.verbose))?;

    let result = match &cli.command {
        Commands::Convert(a) => exec_convert(&a.args),
        Commands::Sort(a) => exec_sort(&a.args),
        Commands::Split(a) => exec_split(&a.args),
        Commands::Cast(a) => exec_cast(&a.args),
        Commands::Process(a) => exec_process(&a.args),
        Commands::Query(a) => exec_query(&a.args),
        Commands::Rpn(a) => exec_rpn(&a.args),
        Commands::Combinelogfiles(a) => exec_combinelogfiles(&a.args),
        Commands::Imageprofiles(a) => exec_imageprofiles(&a.args),
    };
    if let Err(e) = result {
        print_errors(&e, PrintErrors::Exit);
    }
    Ok(())
}
