//! External preprocessor invocation.
//!
//! The generator does not reimplement the C preprocessor; it drives the
//! system compiler (`gcc -E` by default) over the concatenated sources,
//! and separately asks for the final macro table (`gcc -E -dM`) to expand
//! user macro bodies against. Extensions that would confuse the
//! declaration scanner are defined away, matching how the shims are later
//! compiled.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::CompanionError;

/// Defines applied to every preprocessor run.
const DEFAULT_DEFINES: &[(&str, &str)] = &[
    ("__extension__", ""),
    ("__attribute__(x)", ""),
    ("__restrict", ""),
    ("__asm__(x)", ""),
];

/// Runs `compiler -E` over `source`, returning the preprocessed text.
///
/// # Errors
///
/// [`CompanionError::Compiler`] when the compiler cannot be spawned, exits
/// nonzero, or emits non-UTF-8 output.
pub fn run_cpp(
    compiler: &str,
    source: &str,
    include_paths: &[std::path::PathBuf],
    defines: &[(String, String)],
) -> Result<String, CompanionError> {
    run(compiler, &["-E", "-"], source, include_paths, defines)
}

/// Runs `compiler -E -dM` over `source`, returning the complete macro
/// table as `#define` lines (system and user macros alike).
///
/// # Errors
///
/// See [`run_cpp`].
pub fn run_macro_dump(
    compiler: &str,
    source: &str,
    include_paths: &[std::path::PathBuf],
    defines: &[(String, String)],
) -> Result<String, CompanionError> {
    run(compiler, &["-E", "-dM", "-"], source, include_paths, defines)
}

fn run(
    compiler: &str,
    args: &[&str],
    source: &str,
    include_paths: &[std::path::PathBuf],
    defines: &[(String, String)],
) -> Result<String, CompanionError> {
    let mut parts = compiler.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| CompanionError::Compiler("empty compiler command".into()))?;

    let mut command = Command::new(program);
    command.args(parts);
    for path in include_paths {
        command.arg("-I").arg(path);
    }
    for (name, value) in DEFAULT_DEFINES {
        command.arg(format!("-D{name}={value}"));
    }
    for (name, value) in defines {
        command.arg(format!("-D{name}={value}"));
    }
    command.args(args);
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| CompanionError::Compiler(format!("cannot spawn {program}: {e}")))?;
    child
        .stdin
        .take()
        .ok_or_else(|| CompanionError::Compiler("no stdin pipe".into()))?
        .write_all(source.as_bytes())
        .map_err(|e| CompanionError::Compiler(format!("writing to {program}: {e}")))?;

    let output = child
        .wait_with_output()
        .map_err(|e| CompanionError::Compiler(format!("waiting for {program}: {e}")))?;
    if !output.status.success() {
        return Err(CompanionError::Compiler(format!(
            "{program} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    String::from_utf8(output.stdout)
        .map_err(|_| CompanionError::Compiler(format!("{program} produced non-UTF-8 output")))
}
