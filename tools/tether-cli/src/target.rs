//! Target connection and the peek/poke/call/echo commands.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tether::graph::TypeGraph;
use tether::{Arg, Commander, Lib, Value};

use crate::cli::{CallArgs, Cli, EchoArgs, PeekArgs, PokeArgs};
use crate::config::Config;
use crate::verbose::{self, dprintln, vprintln};

/// Loads the type graph from the configured ELF image.
pub fn load_graph(cli: &Cli, config: &Config) -> Result<TypeGraph> {
    let path: PathBuf = cli
        .elf
        .clone()
        .or_else(|| config.elf.clone())
        .context("no target ELF given (use --elf or tether.toml)")?;
    let _t = verbose::Timer::start("type graph");
    let graph = TypeGraph::load(&path)
        .with_context(|| format!("loading debug info from {}", path.display()))?;
    vprintln!(
        "  {} names, {}-byte pointers",
        graph.names().count(),
        graph.word_size
    );
    Ok(graph)
}

/// Connects to the target using the CLI flags, then the config file.
pub fn connect(cli: &Cli, config: &Config, word_size: usize) -> Result<Commander> {
    let link = config.link.as_ref();
    let mut commander = if let Some(addr) = cli.tcp.as_ref().or(link.and_then(|l| l.tcp.as_ref()))
    {
        dprintln!("Connecting to {addr}...");
        Commander::connect_tcp(addr, word_size)?
    } else if let Some(dev) = cli
        .serial
        .as_ref()
        .or(link.and_then(|l| l.serial.as_ref()))
    {
        let baud = cli
            .baud
            .or(link.and_then(|l| l.baud))
            .unwrap_or(115_200);
        dprintln!("Opening {} at {baud} baud...", dev.display());
        Commander::connect_serial(dev, baud, word_size)?
    } else {
        bail!("no link endpoint given (use --tcp/--serial or tether.toml)");
    };
    commander.trace = verbose::is_verbose();
    Ok(commander)
}

/// Resolves a peek/poke address: a number, or a global variable name.
fn resolve_address(graph: &TypeGraph, spec: &str) -> Result<u64> {
    if let Ok(value) = parse_int(spec) {
        return Ok(value as u64);
    }
    match graph.lookup(spec).map(|id| &graph.node(id).kind) {
        Some(tether::TypeKind::Variable { address, .. }) => {
            (*address).with_context(|| format!("{spec} has no address"))
        }
        _ => bail!("{spec} is neither a number nor a known variable"),
    }
}

/// Parses a decimal or 0x-prefixed integer.
fn parse_int(text: &str) -> Result<i64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return Ok(i64::from_str_radix(hex, 16).or_else(|_| {
            // Large unsigned constants still fit a wire word.
            u64::from_str_radix(hex, 16).map(|v| v as i64)
        })?);
    }
    Ok(text.parse()?)
}

fn hex_dump(addr: u64, bytes: &[u8]) {
    for (i, row) in bytes.chunks(16).enumerate() {
        let line: Vec<String> = row.iter().map(|b| format!("{b:02x}")).collect();
        println!("0x{:08x}  {}", addr + (i * 16) as u64, line.join(" "));
    }
}

/// `tether echo`
pub fn cmd_echo(cli: &Cli, config: &Config, args: &EchoArgs) -> Result<()> {
    let graph = load_graph(cli, config)?;
    let mut commander = connect(cli, config, graph.word_size)?;
    let reply = commander.echo(args.data.as_bytes())?;
    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}

/// `tether peek`
pub fn cmd_peek(cli: &Cli, config: &Config, args: &PeekArgs) -> Result<()> {
    let graph = load_graph(cli, config)?;
    let address = resolve_address(&graph, &args.address)?;
    let mut commander = connect(cli, config, graph.word_size)?;
    let bytes = commander.memory_read(address, args.length)?;
    hex_dump(address, &bytes);
    Ok(())
}

/// `tether poke`
pub fn cmd_poke(cli: &Cli, config: &Config, args: &PokeArgs) -> Result<()> {
    let graph = load_graph(cli, config)?;
    let address = resolve_address(&graph, &args.address)?;
    let bytes = parse_hex_bytes(&args.data)?;
    let mut commander = connect(cli, config, graph.word_size)?;
    commander.memory_write(address, &bytes)?;
    dprintln!("wrote {} bytes at 0x{address:08x}", bytes.len());
    Ok(())
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).context("bad hex digit"))
        .collect()
}

/// `tether call`
pub fn cmd_call(cli: &Cli, config: &Config, args: &CallArgs) -> Result<()> {
    let graph = load_graph(cli, config)?;
    let commander = connect(cli, config, graph.word_size)?;
    let lib = Lib::attach(graph, commander);

    // Arm the allocator when a heap symbol is available; calls returning
    // wide structs or taking buffers need it, plain calls do not.
    let heap_symbol = args
        .heap_symbol
        .clone()
        .or_else(|| config.heap_symbol.clone())
        .unwrap_or_else(|| tether::library::DEFAULT_HEAP_SYMBOL.to_string());
    match lib.init_heap(&heap_symbol) {
        Ok(()) => vprintln!("  scratch heap at symbol {heap_symbol}"),
        Err(err) => vprintln!("  no scratch heap ({err})"),
    }

    let call_args: Vec<Arg<'_, '_>> = args
        .args
        .iter()
        .map(|a| parse_int(a).map(Arg::Int))
        .collect::<Result<_>>()?;

    match lib.func(&args.name)?.call(&call_args)? {
        None => dprintln!("(void)"),
        Some(Value::Int(v)) => println!("{v} (0x{v:x})"),
        Some(Value::Var(var)) => {
            println!("{} @ 0x{:08x}", var.typename(), var.address());
            let size = usize::try_from(lib.sizeof_var(&var)).unwrap_or(0);
            if size > 0 {
                hex_dump(var.address(), &lib.read_mem(var.address(), size)?);
            }
        }
        Some(Value::Func(f)) => println!("function @ 0x{:08x}", f.address()),
    }
    Ok(())
}
