//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive and inspect a remote C target through its debug info.
#[derive(Parser)]
#[command(name = "tether", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./tether.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Target ELF image (overrides the config file).
    #[arg(long, global = true)]
    pub elf: Option<PathBuf>,

    /// Connect over TCP (host:port).
    #[arg(long, global = true)]
    pub tcp: Option<String>,

    /// Connect over a serial device.
    #[arg(long, global = true)]
    pub serial: Option<PathBuf>,

    /// Serial baud rate.
    #[arg(long, global = true)]
    pub baud: Option<u32>,

    /// Enable verbose output, including wire traces.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Only print errors and command results.
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Parse the target ELF and dump its type graph.
    Inspect(InspectArgs),
    /// Round-trip bytes through the target.
    Echo(EchoArgs),
    /// Read target memory.
    Peek(PeekArgs),
    /// Write target memory.
    Poke(PokeArgs),
    /// Call a target function with integer arguments.
    Call(CallArgs),
    /// Generate companion C source for inline functions and macros.
    Companion(CompanionArgs),
}

/// Arguments for the `inspect` subcommand.
#[derive(Parser)]
pub struct InspectArgs {
    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Only show entries whose name contains this substring.
    #[arg(long)]
    pub filter: Option<String>,
}

/// Arguments for the `echo` subcommand.
#[derive(Parser)]
pub struct EchoArgs {
    /// Payload text to round-trip.
    pub data: String,
}

/// Arguments for the `peek` subcommand.
#[derive(Parser)]
pub struct PeekArgs {
    /// Address (decimal or 0x-prefixed hex), or a global variable name.
    pub address: String,

    /// Number of bytes to read.
    #[arg(default_value = "16")]
    pub length: usize,
}

/// Arguments for the `poke` subcommand.
#[derive(Parser)]
pub struct PokeArgs {
    /// Address (decimal or 0x-prefixed hex), or a global variable name.
    pub address: String,

    /// Bytes to write, as hex digits.
    pub data: String,
}

/// Arguments for the `call` subcommand.
#[derive(Parser)]
pub struct CallArgs {
    /// Function name.
    pub name: String,

    /// Integer arguments (decimal or 0x-prefixed hex).
    pub args: Vec<String>,

    /// Scratch heap symbol, armed before the call when present.
    #[arg(long)]
    pub heap_symbol: Option<String>,
}

/// Arguments for the `companion` subcommand.
#[derive(Parser)]
pub struct CompanionArgs {
    /// Header/source files to scan.
    pub sources: Vec<PathBuf>,

    /// Include paths for the preprocessor.
    #[arg(long = "include", short = 'I')]
    pub include_paths: Vec<PathBuf>,

    /// Extra defines, as NAME or NAME=VALUE.
    #[arg(long = "define", short = 'D')]
    pub defines: Vec<String>,

    /// Preprocessor command.
    #[arg(long)]
    pub compiler: Option<String>,

    /// Symbol names to leave alone.
    #[arg(long)]
    pub ignore: Vec<String>,

    /// Output file (stdout when absent).
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}
