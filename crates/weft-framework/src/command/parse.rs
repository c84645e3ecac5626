//! Binding input text to a command's declared arguments and options.
//!
//! Matching never fails loudly: anything that does not fit the declaration
//! (unknown leading word, bad number, missing required argument, surplus
//! words) yields `None`.

use std::collections::BTreeMap;

use serde::Serialize;

use super::Command;
use super::declare::{ArgKind, ArgValue};
use super::shortcut::Expansion;
use super::split::{Token, tokenize};

/// The bindings produced by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandMatch {
    /// Canonical name of the matched command.
    pub command: String,
    args: Vec<(String, ArgValue)>,
    options: BTreeMap<String, ArgValue>,
}

impl CommandMatch {
    /// Bound positional values in declaration order. Absent optional
    /// arguments are skipped.
    pub fn args(&self) -> impl Iterator<Item = &ArgValue> {
        self.args.iter().map(|(_, v)| v)
    }

    /// Returns the positional value bound to `name`.
    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.args.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns the `index`-th bound positional value.
    pub fn arg_at(&self, index: usize) -> Option<&ArgValue> {
        self.args.get(index).map(|(_, v)| v)
    }

    /// All option values, including defaults.
    pub fn options(&self) -> &BTreeMap<String, ArgValue> {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&ArgValue> {
        self.options.get(name)
    }
}

/// Matches `input` against `command`, first by name/alias, then by shortcut.
pub(crate) fn parse(command: &Command, input: &str) -> Option<CommandMatch> {
    let input = input.trim();
    let tokens = tokenize(input);
    let first = tokens.first()?;

    let named = !first.quoted
        && (first.value == command.name() || command.aliases().iter().any(|a| *a == first.value));
    if named && let Some(matched) = bind_tokens(command, input, &tokens[1..]) {
        return Some(matched);
    }

    command
        .shortcuts()
        .iter()
        .find_map(|shortcut| shortcut.expand(input))
        .and_then(|expansion| bind_expansion(command, expansion))
}

fn bind_tokens(command: &Command, input: &str, tokens: &[Token]) -> Option<CommandMatch> {
    let mut binder = Binder::new(command);
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        let is_last = i + 1 == tokens.len();

        if token.is_flag()
            && let Some(opt) = command.options().iter().find(|o| o.matches_flag(&token.value))
        {
            match &opt.value {
                None => {
                    binder.options.insert(opt.name.clone(), ArgValue::Boolean(true));
                }
                Some(value) => {
                    let next = tokens
                        .get(i + 1)
                        .filter(|t| !(t.is_flag() && binder.is_known_flag(&t.value)));
                    match next {
                        Some(next) if value.kind == ArgKind::Text => {
                            let rest = remainder(input, next, i + 2 == tokens.len());
                            binder.options.insert(opt.name.clone(), ArgValue::String(rest));
                            break;
                        }
                        Some(next) => {
                            binder
                                .options
                                .insert(opt.name.clone(), value.kind.coerce(&next.value)?);
                            i += 1;
                        }
                        None if value.required => return None,
                        None => {
                            let fallback = opt.default.clone().unwrap_or(ArgValue::Boolean(true));
                            binder.options.insert(opt.name.clone(), fallback);
                        }
                    }
                }
            }
            i += 1;
            continue;
        }

        match binder.next_spec() {
            Some(spec) if spec.kind == ArgKind::Text => {
                let name = spec.name.clone();
                binder
                    .args
                    .push((name, ArgValue::String(remainder(input, token, is_last))));
                break;
            }
            _ => binder.push_positional(&token.value)?,
        }
        i += 1;
    }

    binder.finish()
}

fn bind_expansion(command: &Command, expansion: Expansion) -> Option<CommandMatch> {
    let mut binder = Binder::new(command);
    for raw in &expansion.args {
        match binder.next_spec() {
            Some(spec) if spec.kind == ArgKind::Text => {
                let name = spec.name.clone();
                binder.args.push((name, ArgValue::String(raw.clone())));
            }
            _ => binder.push_positional(raw)?,
        }
    }
    for (name, raw) in &expansion.options {
        let opt = command.options().iter().find(|o| &o.name == name)?;
        let kind = opt.value.as_ref().map_or(ArgKind::Boolean, |v| v.kind);
        binder.options.insert(opt.name.clone(), kind.coerce(raw)?);
    }
    binder.finish()
}

/// The rest of the input starting at `token`, verbatim. A lone final token
/// yields its unquoted value.
fn remainder(input: &str, token: &Token, is_last: bool) -> String {
    if is_last {
        token.value.clone()
    } else {
        input[token.start..].trim_end().to_string()
    }
}

struct Binder<'c> {
    command: &'c Command,
    args: Vec<(String, ArgValue)>,
    variadic: Vec<ArgValue>,
    options: BTreeMap<String, ArgValue>,
}

impl<'c> Binder<'c> {
    fn new(command: &'c Command) -> Self {
        Self {
            command,
            args: Vec::new(),
            variadic: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    fn next_spec(&self) -> Option<&'c super::ArgSpec> {
        self.command.args().get(self.args.len())
    }

    fn is_known_flag(&self, token: &str) -> bool {
        self.command.options().iter().any(|o| o.matches_flag(token))
    }

    fn push_positional(&mut self, raw: &str) -> Option<()> {
        let spec = self.next_spec()?;
        let value = spec.kind.coerce(raw)?;
        if spec.variadic {
            self.variadic.push(value);
        } else {
            self.args.push((spec.name.clone(), value));
        }
        Some(())
    }

    fn finish(mut self) -> Option<CommandMatch> {
        if let Some(spec) = self.next_spec()
            && spec.variadic
            && !self.variadic.is_empty()
        {
            let items = std::mem::take(&mut self.variadic);
            self.args.push((spec.name.clone(), ArgValue::List(items)));
        }

        let bound = self.args.len();
        if self.command.args().iter().skip(bound).any(|spec| spec.required) {
            return None;
        }

        for opt in self.command.options() {
            if self.options.contains_key(&opt.name) {
                continue;
            }
            if let Some(default) = &opt.default {
                self.options.insert(opt.name.clone(), default.clone());
            } else if opt.is_flag() {
                self.options.insert(opt.name.clone(), ArgValue::Boolean(false));
            }
        }

        Some(CommandMatch {
            command: self.command.name().to_string(),
            args: self.args,
            options: self.options,
        })
    }
}
