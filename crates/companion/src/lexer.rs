//! Tokenizer for preprocessed C source.
//!
//! Produces just enough token structure to find inline function
//! definitions and balance braces: identifiers, numbers, string and
//! character literals, and single-character punctuation. Comments and
//! preprocessor line markers are skipped.

/// A C token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An identifier or keyword.
    Ident(String),
    /// A numeric literal, verbatim.
    Number(String),
    /// A string literal, verbatim including quotes.
    Str(String),
    /// A character literal, verbatim including quotes.
    Char(String),
    /// Any other single character.
    Punct(char),
}

impl Token {
    /// Renders the token back to source text.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Ident(s) | Self::Number(s) | Self::Str(s) | Self::Char(s) => s.clone(),
            Self::Punct(c) => c.to_string(),
        }
    }

    /// `true` for an identifier equal to `word`.
    #[must_use]
    pub fn is_ident(&self, word: &str) -> bool {
        matches!(self, Self::Ident(s) if s == word)
    }

    /// `true` for the given punctuation character.
    #[must_use]
    pub fn is_punct(&self, c: char) -> bool {
        matches!(self, Self::Punct(p) if *p == c)
    }
}

/// Tokenize C source. Lines whose first non-blank character is `#`
/// (preprocessor directives and line markers) are skipped entirely.
#[must_use]
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut at_line_start = true;

    while let Some(&(_, ch)) = chars.peek() {
        match ch {
            '\n' => {
                chars.next();
                at_line_start = true;
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' if at_line_start => {
                // Directive or line marker: consume to end of line,
                // honoring backslash continuations.
                let mut prev = '#';
                for (_, c) in chars.by_ref() {
                    if c == '\n' && prev != '\\' {
                        break;
                    }
                    prev = c;
                }
            }
            '/' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '/')) => {
                        for (_, c) in chars.by_ref() {
                            if c == '\n' {
                                at_line_start = true;
                                break;
                            }
                        }
                    }
                    Some(&(_, '*')) => {
                        chars.next();
                        let mut prev = ' ';
                        for (_, c) in chars.by_ref() {
                            if prev == '*' && c == '/' {
                                break;
                            }
                            prev = c;
                        }
                    }
                    _ => {
                        tokens.push(Token::Punct('/'));
                        at_line_start = false;
                    }
                }
            }
            '"' | '\'' => {
                let quote = ch;
                chars.next();
                let mut literal = String::new();
                literal.push(quote);
                while let Some((_, c)) = chars.next() {
                    literal.push(c);
                    if c == '\\' {
                        if let Some((_, escaped)) = chars.next() {
                            literal.push(escaped);
                        }
                        continue;
                    }
                    if c == quote {
                        break;
                    }
                }
                tokens.push(if quote == '"' {
                    Token::Str(literal)
                } else {
                    Token::Char(literal)
                });
                at_line_start = false;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
                at_line_start = false;
            }
            c if c.is_ascii_digit() => {
                let mut number = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    // Good enough for suffixes, hex, and exponents.
                    if c.is_ascii_alphanumeric() || c == '.' || c == 'x' || c == 'X' {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(number));
                at_line_start = false;
            }
            c => {
                chars.next();
                tokens.push(Token::Punct(c));
                at_line_start = false;
            }
        }
    }
    tokens
}
