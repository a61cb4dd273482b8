//! Inline function discovery.
//!
//! Walks the token stream of the preprocessed source at brace depth zero
//! looking for `inline` definitions. Inline bodies leave no symbol in the
//! linked image, so each one found here gets a real, sectioned wrapper
//! emitted by the generator.

use crate::lexer::{Token, tokenize};

/// One function parameter.
#[derive(Debug, Clone)]
pub struct Param {
    /// Parameter type text (e.g. `"uint32_t"`, `"a_t *"`).
    pub ty: String,
    /// Parameter name; `None` when the declaration omits it.
    pub name: Option<String>,
}

/// An `inline` function definition found in the source.
#[derive(Debug, Clone)]
pub struct InlineFn {
    /// Function name.
    pub name: String,
    /// Return type text (`"void"` included).
    pub return_type: String,
    /// Parameters in order; empty for `(void)` and `()`.
    pub params: Vec<Param>,
}

impl InlineFn {
    /// `true` when the function returns `void`.
    #[must_use]
    pub fn returns_void(&self) -> bool {
        self.return_type == "void"
    }

    /// The parameter list as C source, `"void"` when empty.
    #[must_use]
    pub fn param_decls(&self) -> String {
        if self.params.is_empty() {
            return "void".into();
        }
        self.params
            .iter()
            .map(|p| match &p.name {
                Some(name) => format!("{} {name}", p.ty),
                None => p.ty.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The comma-separated names of named parameters, for forwarding.
    #[must_use]
    pub fn forward_args(&self) -> String {
        self.params
            .iter()
            .filter_map(|p| p.name.clone())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Specifiers that do not belong in a wrapper's return type.
const DROPPED_SPECIFIERS: &[&str] = &["inline", "__inline", "__inline__", "static", "extern"];

/// Finds all top-level `inline` function definitions in `source`.
#[must_use]
pub fn scan_inlines(source: &str) -> Vec<InlineFn> {
    let tokens = tokenize(source);
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Punct('{') => {
                depth += 1;
                i += 1;
            }
            Token::Punct('}') => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            Token::Ident(word)
                if depth == 0 && DROPPED_SPECIFIERS[..3].contains(&word.as_str()) =>
            {
                match parse_definition(&tokens, i) {
                    Some((func, next)) => {
                        found.push(func);
                        i = next;
                    }
                    None => i += 1,
                }
            }
            _ => i += 1,
        }
    }
    found
}

/// Parses `inline RET name(params) { … }` starting at the `inline` token.
/// Returns the function and the index just past the closing body brace.
fn parse_definition(tokens: &[Token], start: usize) -> Option<(InlineFn, usize)> {
    // Collect specifier/declarator tokens up to the function name, which
    // is the identifier immediately followed by `(`.
    let mut ret = Vec::new();
    let mut i = start;
    let name = loop {
        let token = tokens.get(i)?;
        match token {
            Token::Ident(word) => {
                if tokens.get(i + 1)?.is_punct('(') {
                    break word.clone();
                }
                if !DROPPED_SPECIFIERS.contains(&word.as_str()) {
                    ret.push(word.clone());
                }
                i += 1;
            }
            Token::Punct('*') => {
                ret.push("*".into());
                i += 1;
            }
            _ => return None, // not a function definition
        }
    };
    if ret.is_empty() {
        return None;
    }

    // Parameter list.
    let mut i = i + 2; // past name and '('
    let mut paren_depth = 1usize;
    let mut current: Vec<Token> = Vec::new();
    let mut params = Vec::new();
    loop {
        let token = tokens.get(i)?;
        match token {
            Token::Punct('(') => {
                paren_depth += 1;
                current.push(token.clone());
            }
            Token::Punct(')') => {
                paren_depth -= 1;
                if paren_depth == 0 {
                    let is_void = current.len() == 1 && current[0].is_ident("void");
                    if !current.is_empty() && !is_void {
                        params.push(parse_param(&current)?);
                    }
                    break;
                }
                current.push(token.clone());
            }
            Token::Punct(',') if paren_depth == 1 => {
                params.push(parse_param(&current)?);
                current.clear();
            }
            _ => current.push(token.clone()),
        }
        i += 1;
    }

    // Require a body; a bare declaration gets no shim.
    let mut i = i + 1;
    if !tokens.get(i)?.is_punct('{') {
        return None;
    }
    let mut brace_depth = 0usize;
    loop {
        let token = tokens.get(i)?;
        if token.is_punct('{') {
            brace_depth += 1;
        } else if token.is_punct('}') {
            brace_depth -= 1;
            if brace_depth == 0 {
                i += 1;
                break;
            }
        }
        i += 1;
    }

    Some((
        InlineFn {
            name,
            return_type: join_type(&ret),
            params,
        },
        i,
    ))
}

/// Splits one parameter's tokens into type text and name.
fn parse_param(tokens: &[Token]) -> Option<Param> {
    match tokens.split_last()? {
        (Token::Ident(name), ty) if !ty.is_empty() => Some(Param {
            ty: join_type(
                &ty.iter()
                    .map(Token::text)
                    .collect::<Vec<_>>(),
            ),
            name: Some(name.clone()),
        }),
        _ => Some(Param {
            ty: join_type(&tokens.iter().map(Token::text).collect::<Vec<_>>()),
            name: None,
        }),
    }
}

/// Joins type tokens with single spaces.
fn join_type<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}
