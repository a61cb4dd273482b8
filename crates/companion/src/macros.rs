//! `#define` collection, expansion, and classification.
//!
//! Macros leave no DWARF behind, so the generator sorts each one into a
//! bucket by the shape of its *expanded* body and emits a shim for the
//! buckets that have a safe C equivalent:
//!
//! - statement-shaped or empty → no shim exists, skip
//! - function-like → wrapper function returning `unsigned long`
//! - contains a string literal → `const char` array
//! - anything else → `const long long` constant

use std::collections::HashMap;

/// One collected `#define`.
#[derive(Debug, Clone)]
pub struct MacroDef {
    /// Macro name.
    pub name: String,
    /// Parameter names; `Some(vec![])` for `M()`, `None` for object-like.
    pub params: Option<Vec<String>>,
    /// Replacement text, trimmed.
    pub body: String,
}

/// The emission bucket a macro falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroClass {
    /// No shim: empty or statement-shaped expansion.
    Skip,
    /// `unsigned long` wrapper function.
    Function,
    /// `const char[]` string constant.
    String,
    /// `const long long` numeric constant.
    Numeric,
}

/// Collects `#define` directives from raw (unpreprocessed) source text.
///
/// Handles backslash line continuations. Function-like macros are
/// recognized by a `(` immediately following the name.
#[must_use]
pub fn collect_defines(source: &str) -> Vec<MacroDef> {
    let mut defines = Vec::new();
    let mut lines = source.lines();
    while let Some(line) = lines.next() {
        let mut logical = line.to_string();
        while logical.ends_with('\\') {
            logical.pop();
            match lines.next() {
                Some(cont) => logical.push_str(cont),
                None => break,
            }
        }

        let trimmed = logical.trim_start();
        let Some(rest) = trimmed.strip_prefix('#') else {
            continue;
        };
        let Some(rest) = rest.trim_start().strip_prefix("define") else {
            continue;
        };
        let rest = rest.trim_start();

        let name_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        if name_len == 0 {
            continue;
        }
        let name = rest[..name_len].to_string();
        let after = &rest[name_len..];

        let (params, body) = if let Some(arglist) = after.strip_prefix('(') {
            match arglist.find(')') {
                Some(close) => {
                    let params: Vec<String> = arglist[..close]
                        .split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect();
                    (Some(params), arglist[close + 1..].trim().to_string())
                }
                None => continue, // malformed
            }
        } else {
            (None, after.trim().to_string())
        };

        defines.push(MacroDef { name, params, body });
    }
    defines
}

/// Expands object-like macro references in `body` against `table`,
/// iterating until a fixed point (bounded, in case of cycles).
#[must_use]
pub fn expand(body: &str, table: &HashMap<String, String>) -> String {
    let mut current = body.to_string();
    for _ in 0..16 {
        let next = substitute_once(&current, table);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn substitute_once(text: &str, table: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() {
                let c = bytes[i] as char;
                if c.is_ascii_alphanumeric() || c == '_' {
                    i += 1;
                } else {
                    break;
                }
            }
            let word = &text[start..i];
            match table.get(word) {
                Some(replacement) => out.push_str(replacement),
                None => out.push_str(word),
            }
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// Words whose presence marks an expansion as statement-shaped.
const STATEMENT_WORDS: &[&str] = &["if", "else", "while", "do", "__attribute__", "inline"];

/// Characters whose presence marks an expansion as statement-shaped.
const STATEMENT_CHARS: &[char] = &['#', '{', '}', '?', ':'];

/// `true` when `word` occurs in `text` on identifier boundaries.
fn contains_word(text: &str, word: &str) -> bool {
    let mut search = text;
    while let Some(pos) = search.find(word) {
        let before_ok = pos == 0
            || !search[..pos]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let after = &search[pos + word.len()..];
        let after_ok = !after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if before_ok && after_ok {
            return true;
        }
        search = &search[pos + word.len()..];
    }
    false
}

/// Sorts a macro into its emission bucket given its expanded body.
#[must_use]
pub fn classify(def: &MacroDef, expanded: &str) -> MacroClass {
    if def.body.trim().is_empty() || expanded.trim().is_empty() {
        return MacroClass::Skip;
    }
    if expanded.contains(STATEMENT_CHARS)
        || STATEMENT_WORDS.iter().any(|w| contains_word(expanded, w))
    {
        return MacroClass::Skip;
    }
    if def.params.is_some() {
        return MacroClass::Function;
    }
    if expanded.contains('"') {
        return MacroClass::String;
    }
    MacroClass::Numeric
}
