//! Option declarations.
//!
//! An option spec lists its flags, an optional value placeholder, and help
//! text, in that order:
//!
//! ```text
//! -n, --count <count:number> how many times
//! -v [version:string] target version
//! -f, --force skip confirmation
//! ```
//!
//! The option is keyed by its long name, falling back to the placeholder
//! name, then to the short letter. An option without a placeholder is a
//! boolean flag.

use crate::error::CommandError;

use super::declare::{ArgKind, ArgSpec, ArgValue};

/// The value an option takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionValue {
    pub name: String,
    pub kind: ArgKind,
    /// `<...>` placeholders require a value after the flag.
    pub required: bool,
}

/// One declared option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    /// Key in the option map.
    pub name: String,
    pub shorts: Vec<char>,
    pub long: Option<String>,
    /// `None` for boolean flags.
    pub value: Option<OptionValue>,
    pub default: Option<ArgValue>,
    pub help: String,
}

impl OptionSpec {
    /// Parses a flag spec such as `-n, --count <count:number> help text`.
    pub fn parse(spec: &str) -> Result<Self, CommandError> {
        let invalid = |reason: &str| CommandError::InvalidOption {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut shorts = Vec::new();
        let mut long = None;
        let mut value = None;
        let mut words = spec.split_whitespace().peekable();

        while let Some(&word) = words.peek() {
            let flag = word.trim_end_matches(',');
            if let Some(name) = flag.strip_prefix("--") {
                if name.is_empty() || long.is_some() {
                    return Err(invalid("expected a single --long flag"));
                }
                long = Some(name.to_string());
            } else if let Some(letters) = flag.strip_prefix('-')
                && letters.chars().count() == 1
            {
                shorts.extend(letters.chars());
            } else if value.is_none() && (flag.starts_with('<') || flag.starts_with('[')) {
                let arg = ArgSpec::parse(flag)?;
                if arg.variadic {
                    return Err(invalid("option values cannot be variadic"));
                }
                value = Some(OptionValue {
                    name: arg.name,
                    kind: arg.kind,
                    required: arg.required,
                });
            } else {
                break;
            }
            words.next();
        }

        let help = words.collect::<Vec<_>>().join(" ");
        let name = long
            .clone()
            .or_else(|| value.as_ref().map(|v| v.name.clone()))
            .or_else(|| shorts.first().map(char::to_string))
            .ok_or_else(|| invalid("no flag given"))?;
        if shorts.is_empty() && long.is_none() {
            return Err(invalid("no flag given"));
        }

        Ok(Self {
            name,
            shorts,
            long,
            value,
            default: None,
            help,
        })
    }

    /// Sets the value used when the option is absent.
    pub fn with_default(mut self, default: impl Into<ArgValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Returns `true` if `token` is one of this option's flags.
    pub fn matches_flag(&self, token: &str) -> bool {
        if let Some(long) = token.strip_prefix("--") {
            return self.long.as_deref() == Some(long);
        }
        match token.strip_prefix('-') {
            Some(letters) => {
                let mut chars = letters.chars();
                matches!((chars.next(), chars.next()), (Some(c), None) if self.shorts.contains(&c))
            }
            None => false,
        }
    }

    /// Returns `true` for value-less options.
    pub fn is_flag(&self) -> bool {
        self.value.is_none()
    }

    /// Renders the flags and placeholder, e.g. `-n, --count <count:number>`.
    pub fn usage(&self) -> String {
        let mut parts: Vec<String> = self.shorts.iter().map(|c| format!("-{c}")).collect();
        if let Some(long) = &self.long {
            parts.push(format!("--{long}"));
        }
        let mut usage = parts.join(", ");
        if let Some(value) = &self.value {
            let (open, close) = if value.required { ('<', '>') } else { ('[', ']') };
            usage.push_str(&format!(" {open}{}:{}{close}", value.name, value.kind));
        }
        usage
    }
}
