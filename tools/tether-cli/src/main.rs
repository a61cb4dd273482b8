//! Command-line front end for the tether host library.
//!
//! Pipeline per command: load tether.toml → parse the target ELF into a
//! type graph → connect the link (TCP or serial) → run the request.
//! `inspect` and `companion` stop before the link; they work offline.

mod cli;
mod companion_cmd;
mod config;
mod inspect;
mod target;
mod verbose;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    verbose::init(cli.quiet, cli.verbose);
    let config = config::load(cli.config.as_deref())?;

    match &cli.command {
        cli::Command::Inspect(args) => {
            let graph = target::load_graph(&cli, &config)?;
            inspect::dump(&graph, args)
        }
        cli::Command::Echo(args) => target::cmd_echo(&cli, &config, args),
        cli::Command::Peek(args) => target::cmd_peek(&cli, &config, args),
        cli::Command::Poke(args) => target::cmd_poke(&cli, &config, args),
        cli::Command::Call(args) => target::cmd_call(&cli, &config, args),
        cli::Command::Companion(args) => companion_cmd::cmd_companion(&config, args),
    }
}
