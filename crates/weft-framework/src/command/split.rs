//! Shell-like tokenizer for command input.
//!
//! Tokens remember the byte range they were read from so that a `text`
//! argument can take the rest of the input verbatim.

/// A single word of command input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The unquoted, unescaped value.
    pub value: String,
    /// Byte offset of the first character of the token (including an opening quote).
    pub start: usize,
    /// `true` if any part of the token was quoted.
    pub quoted: bool,
}

impl Token {
    /// Returns `true` if the token looks like `-x` or `--long` and was not quoted.
    pub fn is_flag(&self) -> bool {
        !self.quoted && self.value.starts_with('-') && self.value.len() > 1
    }
}

/// Splits `input` on unquoted whitespace.
///
/// Single quotes take everything literally; inside double quotes a backslash
/// escapes the next character. An unterminated quote runs to the end of input.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start: Option<usize> = None;
    let mut quoted = false;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for (pos, ch) in input.char_indices() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                start.get_or_insert(pos);
                quoted = true;
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                start.get_or_insert(pos);
                quoted = true;
                in_double_quote = !in_double_quote;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if let Some(begin) = start.take() {
                    tokens.push(Token {
                        value: std::mem::take(&mut current),
                        start: begin,
                        quoted,
                    });
                    quoted = false;
                }
            }
            _ => {
                start.get_or_insert(pos);
                current.push(ch);
            }
        }
    }

    if let Some(begin) = start {
        tokens.push(Token {
            value: current,
            start: begin,
            quoted,
        });
    }

    tokens
}
