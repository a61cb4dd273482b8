//! The `companion` subcommand: generate shim C source.

use anyhow::{Context, Result};
use tether_companion::Companion;

use crate::cli::CompanionArgs;
use crate::config::Config;
use crate::verbose::dprintln;

/// Splits a `NAME` or `NAME=VALUE` define.
fn split_define(spec: &str) -> (String, String) {
    match spec.split_once('=') {
        Some((name, value)) => (name.to_string(), value.to_string()),
        None => (spec.to_string(), "1".to_string()),
    }
}

/// Runs companion generation from CLI arguments merged over the config.
pub fn cmd_companion(config: &Config, args: &CompanionArgs) -> Result<()> {
    let defaults = config.companion.as_ref();

    let mut companion = Companion::default();
    companion.sources = if args.sources.is_empty() {
        defaults.map(|c| c.sources.clone()).unwrap_or_default()
    } else {
        args.sources.clone()
    };
    companion.include_paths = args
        .include_paths
        .iter()
        .chain(defaults.iter().flat_map(|c| c.include_paths.iter()))
        .cloned()
        .collect();
    companion.defines = args
        .defines
        .iter()
        .chain(defaults.iter().flat_map(|c| c.defines.iter()))
        .map(|d| split_define(d))
        .collect();
    if let Some(compiler) = args
        .compiler
        .clone()
        .or_else(|| defaults.and_then(|c| c.compiler.clone()))
    {
        companion.compiler = Some(compiler);
    }
    companion.ignore = args.ignore.clone();

    if companion.sources.is_empty() {
        anyhow::bail!("no sources given (arguments or tether.toml [companion])");
    }

    let output = companion.generate().context("companion generation")?;

    let destination = args
        .output
        .clone()
        .or_else(|| defaults.and_then(|c| c.output.clone()));
    match destination {
        Some(path) => {
            std::fs::write(&path, &output)
                .with_context(|| format!("writing {}", path.display()))?;
            dprintln!("wrote {} ({} bytes)", path.display(), output.len());
        }
        None => print!("{output}"),
    }
    Ok(())
}
