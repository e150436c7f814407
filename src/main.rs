use anyhow::Result;
use batch_flow::cli::Cli;
use batch_flow::logging;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);
    cli.run()
}
