//! Regular-expression shortcuts.
//!
//! A shortcut maps free-form input onto a command's canonical bindings.
//! Templates may reference capture groups as `$1` or `${name}`:
//!
//! ```rust,ignore
//! Shortcut::new(r"^roll (\d+)$")?
//!     .arg("$1")
//!     .option("sides", "6")
//!     .option("verbose", "true");
//! ```

use regex::Regex;

use crate::error::CommandError;

#[derive(Debug, Clone)]
pub struct Shortcut {
    source: String,
    pattern: Regex,
    args: Vec<String>,
    options: Vec<(String, String)>,
}

impl Shortcut {
    /// Compiles `pattern`. It is matched against the whole trimmed input, so
    /// `^` and `$` are implied.
    pub fn new(pattern: &str) -> Result<Self, CommandError> {
        let compiled = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| CommandError::InvalidShortcut(e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            pattern: compiled,
            args: Vec::new(),
            options: Vec::new(),
        })
    }

    /// Appends a positional argument template.
    pub fn arg(mut self, template: impl Into<String>) -> Self {
        self.args.push(template.into());
        self
    }

    /// Sets an option template, keyed by the option's name.
    pub fn option(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.options.push((name.into(), template.into()));
        self
    }

    /// The pattern as given to [`new`](Self::new).
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// Expands the templates against `input`, or `None` if the pattern does not match.
    pub(crate) fn expand(&self, input: &str) -> Option<Expansion> {
        let caps = self.pattern.captures(input)?;
        let render = |template: &str| {
            let mut out = String::new();
            caps.expand(template, &mut out);
            out
        };
        Some(Expansion {
            args: self.args.iter().map(|t| render(t)).collect(),
            options: self
                .options
                .iter()
                .map(|(name, t)| (name.clone(), render(t)))
                .collect(),
        })
    }
}

/// Raw argument and option strings produced by a matching shortcut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Expansion {
    pub args: Vec<String>,
    pub options: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_numbered_and_named_groups() {
        let shortcut = Shortcut::new(r"^roll (?P<n>\d+)d(\d+)$")
            .unwrap()
            .arg("${n}")
            .option("sides", "$2");

        let expansion = shortcut.expand("roll 3d20").unwrap();
        assert_eq!(expansion.args, vec!["3"]);
        assert_eq!(expansion.options, vec![("sides".to_string(), "20".to_string())]);
        assert!(shortcut.expand("roll three").is_none());
    }

    #[test]
    fn test_pattern_must_cover_whole_input() {
        let shortcut = Shortcut::new(r"roll (\d+)").unwrap().arg("$1");
        assert_eq!(shortcut.pattern(), r"roll (\d+)");
        assert_eq!(shortcut.expand("roll 6").unwrap().args, vec!["6"]);
        assert!(shortcut.expand("please roll 6").is_none());
        assert!(shortcut.expand("roll 6 now").is_none());

        let alternation = Shortcut::new("hi|hello").unwrap();
        assert!(alternation.expand("hello").is_some());
        assert!(alternation.expand("oh hello there").is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            Shortcut::new("(unclosed"),
            Err(CommandError::InvalidShortcut(_))
        ));
    }
}
