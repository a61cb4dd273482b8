//! Companion C source generation.
//!
//! Inline functions and preprocessor macros leave no symbols or DWARF in a
//! compiled target, so the host cannot see them. This crate reads the
//! target's headers ahead of time and emits one auxiliary C compilation
//! unit of *shims* — real, sectioned, `used` functions and constants that
//! forward to the invisible originals. Linked into the target (with a
//! linker script preserving the shim sections), they make inlines callable
//! and macros readable through the normal debug-info path.

pub mod emit;
pub mod inline;
pub mod lexer;
pub mod macros;

mod preprocess;

pub use emit::Naming;
pub use inline::{InlineFn, Param};
pub use macros::{MacroClass, MacroDef};

use std::collections::HashMap;
use std::path::PathBuf;

use core::fmt;

/// Errors produced while generating companion source.
#[derive(Debug)]
pub enum CompanionError {
    /// Reading an input file failed.
    Io(PathBuf, std::io::ErrorKind),
    /// The external preprocessor failed or produced garbage.
    Compiler(String),
}

impl fmt::Display for CompanionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, kind) => write!(f, "reading {}: {kind}", path.display()),
            Self::Compiler(msg) => write!(f, "preprocessor: {msg}"),
        }
    }
}

impl std::error::Error for CompanionError {}

/// Configuration and driver for one companion generation run.
pub struct Companion {
    /// Header/source files to scan (also `#include`d by the output).
    pub sources: Vec<PathBuf>,
    /// Include paths handed to the preprocessor.
    pub include_paths: Vec<PathBuf>,
    /// Extra `-D` defines.
    pub defines: Vec<(String, String)>,
    /// Additional source text appended after the files.
    pub inline_src: String,
    /// External preprocessor command (e.g. `"gcc"`, `"arm-none-eabi-gcc"`).
    /// `None` treats the input as already preprocessed and expands macros
    /// against the user table only.
    pub compiler: Option<String>,
    /// Symbol names to leave alone.
    pub ignore: Vec<String>,
    /// Prefixes and sections for generated symbols.
    pub naming: Naming,
}

impl Default for Companion {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            include_paths: Vec::new(),
            defines: Vec::new(),
            inline_src: String::new(),
            compiler: Some("gcc".into()),
            ignore: Vec::new(),
            naming: Naming::default(),
        }
    }
}

impl Companion {
    /// A generator over inline source text only, no external preprocessor.
    #[must_use]
    pub fn from_source(src: &str) -> Self {
        Self {
            inline_src: src.into(),
            compiler: None,
            ..Self::default()
        }
    }

    /// Runs the full pipeline and returns the companion compilation unit.
    ///
    /// # Errors
    ///
    /// [`CompanionError::Io`] for unreadable sources,
    /// [`CompanionError::Compiler`] for preprocessor failures.
    pub fn generate(&self) -> Result<String, CompanionError> {
        // Concatenate the raw user sources; macros are collected from this
        // text, so only user-defined macros ever get shims.
        let mut unprocessed = String::new();
        for path in &self.sources {
            let text = std::fs::read_to_string(path)
                .map_err(|e| CompanionError::Io(path.clone(), e.kind()))?;
            unprocessed.push_str(&text);
            unprocessed.push('\n');
        }
        unprocessed.push_str(&self.inline_src);

        let user_macros = macros::collect_defines(&unprocessed);

        // Preprocess for the inline scan, and build the expansion table
        // (including system macros when a compiler is available).
        let (preprocessed, table) = match &self.compiler {
            Some(compiler) => {
                let preprocessed = preprocess::run_cpp(
                    compiler,
                    &unprocessed,
                    &self.include_paths,
                    &self.defines,
                )?;
                let dump = preprocess::run_macro_dump(
                    compiler,
                    &unprocessed,
                    &self.include_paths,
                    &self.defines,
                )?;
                (preprocessed, object_macro_table(&macros::collect_defines(&dump)))
            }
            None => (unprocessed.clone(), object_macro_table(&user_macros)),
        };

        let inlines: Vec<InlineFn> = inline::scan_inlines(&preprocessed)
            .into_iter()
            .filter(|f| !self.ignore.contains(&f.name))
            .collect();

        let mut out = self.naming.emit_header(
            &self
                .sources
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
        );

        for func in &inlines {
            out.push_str(&self.naming.emit_inline_wrapper(func));
            out.push_str(&self.naming.emit_inline_ptr_wrapper(func));
        }

        for def in &user_macros {
            if self.ignore.contains(&def.name) {
                continue;
            }
            let expanded = macros::expand(&def.body, &table);
            match macros::classify(def, &expanded) {
                MacroClass::Skip => {}
                MacroClass::String => out.push_str(&self.naming.emit_string_macro(def)),
                MacroClass::Function => out.push_str(&self.naming.emit_function_macro(def)),
                MacroClass::Numeric => out.push_str(&self.naming.emit_numeric_macro(def)),
            }
        }
        Ok(out)
    }
}

/// The object-like subset of a macro list, as an expansion table.
fn object_macro_table(defs: &[MacroDef]) -> HashMap<String, String> {
    defs.iter()
        .filter(|d| d.params.is_none())
        .map(|d| (d.name.clone(), d.body.clone()))
        .collect()
}
