//! Argument declarations and typed values.
//!
//! A placeholder has the form `<name:type>` (required) or `[name:type]`
//! (optional). The type defaults to `string`. A `...` either after the name
//! (`[files:string...]`, `[...files:string]`) or after the closing bracket
//! (`<files:string>...`) marks the argument variadic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

// ============================================================================
// ArgKind
// ============================================================================

/// The primitive type of an argument or option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    /// A single word (or quoted phrase).
    String,
    /// A finite floating-point number.
    Number,
    /// `true`/`false` and common spellings.
    Boolean,
    /// The remainder of the input, verbatim.
    Text,
}

impl ArgKind {
    /// Converts a raw word into a value of this kind, or `None` if it does not parse.
    pub fn coerce(self, raw: &str) -> Option<ArgValue> {
        match self {
            ArgKind::String | ArgKind::Text => Some(ArgValue::String(raw.to_string())),
            ArgKind::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(ArgValue::Number),
            ArgKind::Boolean => match raw.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(ArgValue::Boolean(true)),
                "false" | "no" | "off" | "0" => Some(ArgValue::Boolean(false)),
                _ => None,
            },
        }
    }

    /// Returns the lowercase type name.
    pub fn as_str(self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Number => "number",
            ArgKind::Boolean => "boolean",
            ArgKind::Text => "text",
        }
    }
}

impl FromStr for ArgKind {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "string" | "str" => Ok(ArgKind::String),
            "number" | "num" | "integer" | "int" | "float" => Ok(ArgKind::Number),
            "boolean" | "bool" => Ok(ArgKind::Boolean),
            "text" => Ok(ArgKind::Text),
            other => Err(CommandError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ArgValue
// ============================================================================

/// A bound argument or option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Number(f64),
    Boolean(bool),
    /// The values of a variadic argument.
    List(Vec<ArgValue>),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::String(s) => f.write_str(s),
            ArgValue::Number(n) => write!(f, "{n}"),
            ArgValue::Boolean(b) => write!(f, "{b}"),
            ArgValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::String(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::String(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Number(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Number(value as f64)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Boolean(value)
    }
}

// ============================================================================
// ArgSpec
// ============================================================================

/// One declared positional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    pub variadic: bool,
}

impl ArgSpec {
    /// Parses a single `<name:type>` / `[name:type]` placeholder.
    pub fn parse(token: &str) -> Result<Self, CommandError> {
        let invalid = |reason: &str| CommandError::InvalidArgument {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        let (body, mut variadic) = match token.strip_suffix("...") {
            Some(body) => (body, true),
            None => (token, false),
        };
        let (inner, required) = if let Some(inner) = body
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
        {
            (inner, true)
        } else if let Some(inner) = body
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            (inner, false)
        } else {
            return Err(invalid("expected <name:type> or [name:type]"));
        };

        let mut inner = inner.trim();
        if let Some(rest) = inner.strip_prefix("...") {
            variadic = true;
            inner = rest;
        }
        if let Some(rest) = inner.strip_suffix("...") {
            variadic = true;
            inner = rest;
        }

        let (name, kind) = match inner.split_once(':') {
            Some((name, kind)) => (name.trim(), kind.trim().parse::<ArgKind>()?),
            None => (inner, ArgKind::String),
        };
        if name.is_empty() {
            return Err(invalid("argument name is empty"));
        }
        if variadic && kind == ArgKind::Text {
            return Err(invalid("a text argument cannot be variadic"));
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            required,
            variadic,
        })
    }

    /// Parses the argument part of a command declaration.
    ///
    /// Rejects a required argument after an optional one, and a variadic or
    /// `text` argument that is not last.
    pub fn parse_all<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<Vec<Self>, CommandError> {
        let mut specs: Vec<ArgSpec> = Vec::new();
        for token in tokens {
            let spec = Self::parse(token)?;
            if let Some(prev) = specs.last() {
                if prev.variadic || prev.kind == ArgKind::Text {
                    return Err(CommandError::InvalidArgument {
                        token: token.to_string(),
                        reason: format!("'{}' consumes the rest of the input", prev.name),
                    });
                }
                if spec.required && !prev.required {
                    return Err(CommandError::InvalidArgument {
                        token: token.to_string(),
                        reason: "a required argument cannot follow an optional one".into(),
                    });
                }
            }
            specs.push(spec);
        }
        Ok(specs)
    }

    /// Renders the placeholder back, e.g. `<count:number>`.
    pub fn usage(&self) -> String {
        let dots = if self.variadic { "..." } else { "" };
        if self.required {
            format!("<{}:{}{dots}>", self.name, self.kind)
        } else {
            format!("[{}:{}{dots}]", self.name, self.kind)
        }
    }
}
