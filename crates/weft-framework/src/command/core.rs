//! The [`Command`] definition and its action handlers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use weft_core::{BoxError, MessageScope, Reply};

use crate::context::CommandContext;
use crate::error::CommandError;

use super::declare::{ArgSpec, ArgValue};
use super::option::OptionSpec;
use super::parse::{self, CommandMatch};
use super::shortcut::Shortcut;

/// What an action hands back: a reply, nothing, or a failure.
pub type ActionResult = Result<Option<Reply>, BoxError>;

/// A type-erased action handler.
pub type BoxedAction = Arc<dyn Fn(CommandContext) -> BoxFuture<'static, ActionResult> + Send + Sync>;

// ============================================================================
// ActionOutput
// ============================================================================

/// Return types accepted from action handlers.
///
/// `()` and `None` mean "no output, try the next action".
pub trait ActionOutput: Send {
    fn into_action_result(self) -> ActionResult;
}

impl ActionOutput for () {
    fn into_action_result(self) -> ActionResult {
        Ok(None)
    }
}

impl ActionOutput for Reply {
    fn into_action_result(self) -> ActionResult {
        Ok(Some(self))
    }
}

impl ActionOutput for String {
    fn into_action_result(self) -> ActionResult {
        Ok(Some(Reply::Text(self)))
    }
}

impl ActionOutput for &'static str {
    fn into_action_result(self) -> ActionResult {
        Ok(Some(Reply::text(self)))
    }
}

impl<T: Into<Reply> + Send> ActionOutput for Option<T> {
    fn into_action_result(self) -> ActionResult {
        Ok(self.map(Into::into))
    }
}

impl<T, E> ActionOutput for Result<T, E>
where
    T: ActionOutput,
    E: Into<BoxError> + Send,
{
    fn into_action_result(self) -> ActionResult {
        self.map_err(Into::into)?.into_action_result()
    }
}

// ============================================================================
// Command
// ============================================================================

/// A named, pattern-matched action bound to permission and scope constraints.
///
/// Built from a declaration such as `"roll <sides:number> [times:number]"`,
/// then registered on a plugin:
///
/// ```rust,ignore
/// let roll = Command::new("roll <sides:number>")?
///     .desc("roll a die")
///     .option_default("-t, --times <times:number> rolls", 1)?
///     .alias("r")
///     .action(|ctx: CommandContext| async move {
///         format!("rolled a d{}", ctx.arg("sides").unwrap())
///     });
/// plugin.command(roll).await?;
/// ```
#[derive(Clone)]
pub struct Command {
    name: String,
    args: Vec<ArgSpec>,
    options: Vec<OptionSpec>,
    aliases: Vec<String>,
    shortcuts: Vec<Shortcut>,
    actions: Vec<BoxedAction>,
    permissions: Vec<String>,
    scopes: Vec<MessageScope>,
    hidden: bool,
    desc: String,
}

impl Command {
    /// Parses a declaration: a dot-qualified name followed by argument placeholders.
    ///
    /// Empty segments in the name are dropped (`"a..b"` becomes `"a.b"`); a
    /// name with no segments left is an error.
    pub fn new(declaration: &str) -> Result<Self, CommandError> {
        let mut words = declaration.split_whitespace();
        let name = words
            .next()
            .map(|decl| {
                decl.split('.')
                    .filter(|segment| !segment.is_empty())
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .filter(|name| !name.is_empty())
            .ok_or(CommandError::EmptyName)?;
        let args = ArgSpec::parse_all(words)?;

        Ok(Self {
            name,
            args,
            options: Vec::new(),
            aliases: Vec::new(),
            shortcuts: Vec::new(),
            actions: Vec::new(),
            permissions: Vec::new(),
            scopes: Vec::new(),
            hidden: false,
            desc: String::new(),
        })
    }

    // ─── Builder ────────────────────────────────────────────────────────────

    /// Adds an option from a flag spec. An option with the same name is replaced.
    pub fn option(self, spec: &str) -> Result<Self, CommandError> {
        Ok(self.merge_option(OptionSpec::parse(spec)?))
    }

    /// Adds an option with a value used when the flag is absent.
    pub fn option_default(
        self,
        spec: &str,
        default: impl Into<ArgValue>,
    ) -> Result<Self, CommandError> {
        Ok(self.merge_option(OptionSpec::parse(spec)?.with_default(default)))
    }

    fn merge_option(mut self, option: OptionSpec) -> Self {
        match self.options.iter_mut().find(|o| o.name == option.name) {
            Some(existing) => *existing = option,
            None => self.options.push(option),
        }
        self
    }

    /// Makes the command reachable through another literal word.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Makes the command reachable through a regular expression.
    pub fn shortcut(mut self, shortcut: Shortcut) -> Self {
        self.shortcuts.push(shortcut);
        self
    }

    /// Appends an action handler. Actions run in order until one produces output.
    pub fn action<F, Fut, R>(mut self, action: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: ActionOutput + 'static,
    {
        let boxed: BoxedAction =
            Arc::new(move |ctx| action(ctx).map(R::into_action_result).boxed());
        self.actions.push(boxed);
        self
    }

    /// Requires a permission predicate, e.g. `adapter(discord)` or `master`.
    pub fn permission(mut self, predicate: impl Into<String>) -> Self {
        self.permissions.push(predicate.into());
        self
    }

    /// Restricts the command to a message scope. Repeatable; no scopes means all.
    pub fn scope(mut self, scope: MessageScope) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Excludes the command from listings. It stays invocable.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn shortcuts(&self) -> &[Shortcut] {
        &self.shortcuts
    }

    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    pub fn scopes(&self) -> &[MessageScope] {
        &self.scopes
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn description(&self) -> &str {
        &self.desc
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// One-line usage, e.g. `roll <sides:number> [-t, --times <times:number>]`.
    pub fn usage(&self) -> String {
        let mut usage = self.name.clone();
        for arg in &self.args {
            usage.push(' ');
            usage.push_str(&arg.usage());
        }
        for option in &self.options {
            usage.push_str(&format!(" [{}]", option.usage()));
        }
        usage
    }

    // ─── Matching and execution ─────────────────────────────────────────────

    /// Parses `input` against this command. `None` means "not this command".
    pub fn parse(&self, input: &str) -> Option<CommandMatch> {
        parse::parse(self, input)
    }

    /// Runs the actions in order and returns the first defined output.
    ///
    /// Returns `Ok(None)` when every action produced nothing.
    pub async fn execute(&self, ctx: CommandContext) -> ActionResult {
        for action in &self.actions {
            if let Some(reply) = action(ctx.clone()).await? {
                return Ok(Some(reply));
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("options", &self.options)
            .field("aliases", &self.aliases)
            .field("actions", &self.actions.len())
            .field("permissions", &self.permissions)
            .field("scopes", &self.scopes)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(decl: &str) -> Command {
        Command::new(decl).unwrap()
    }

    #[test]
    fn test_declaration_name_normalization() {
        assert_eq!(cmd("a..b").name(), "a.b");
        assert_eq!(cmd(".a.b.").name(), "a.b");
        assert!(matches!(Command::new(""), Err(CommandError::EmptyName)));
        assert!(matches!(Command::new("..."), Err(CommandError::EmptyName)));
        assert!(matches!(Command::new("  . "), Err(CommandError::EmptyName)));
    }

    #[test]
    fn test_parse_typed_arguments() {
        let roll = cmd("roll <sides:number> [label:string]");
        let m = roll.parse("roll 20 attack").unwrap();
        assert_eq!(m.command, "roll");
        assert_eq!(m.arg("sides"), Some(&ArgValue::Number(20.0)));
        assert_eq!(m.arg_at(1).and_then(ArgValue::as_str), Some("attack"));

        let m = roll.parse("roll 6").unwrap();
        assert_eq!(m.args().count(), 1);

        assert!(roll.parse("roll").is_none(), "missing required");
        assert!(roll.parse("roll six").is_none(), "not a number");
        assert!(roll.parse("roll 6 a b").is_none(), "surplus words");
        assert!(roll.parse("rolls 6").is_none(), "different name");
    }

    #[test]
    fn test_parse_text_takes_rest_verbatim() {
        let say = cmd("say <target:string> <msg:text>");
        let m = say.parse("say bob  hello   -n there").unwrap();
        assert_eq!(m.arg("target").and_then(ArgValue::as_str), Some("bob"));
        assert_eq!(
            m.arg("msg").and_then(ArgValue::as_str),
            Some("hello   -n there")
        );

        let m = say.parse(r#"say bob "quoted words""#).unwrap();
        assert_eq!(m.arg("msg").and_then(ArgValue::as_str), Some("quoted words"));
    }

    #[test]
    fn test_parse_variadic() {
        let sum = cmd("sum <nums:number...>");
        let m = sum.parse("sum 1 2 3").unwrap();
        assert_eq!(
            m.arg("nums").and_then(ArgValue::as_list).map(<[_]>::len),
            Some(3)
        );
        assert!(sum.parse("sum").is_none());
        assert!(sum.parse("sum 1 x").is_none());
    }

    #[test]
    fn test_parse_options_and_defaults() {
        let test = cmd("test [number:number]")
            .option("-b toggle")
            .unwrap()
            .option_default("-n, --count <count:number> how many", 1)
            .unwrap()
            .option("-v [version:string] version")
            .unwrap();

        let m = test.parse("test").unwrap();
        assert_eq!(m.option("b"), Some(&ArgValue::Boolean(false)));
        assert_eq!(m.option("count"), Some(&ArgValue::Number(1.0)));
        assert_eq!(m.option("version"), None);

        let m = test.parse("test -b 5 --count 3 -v").unwrap();
        assert_eq!(m.option("b"), Some(&ArgValue::Boolean(true)));
        assert_eq!(m.option("count"), Some(&ArgValue::Number(3.0)));
        assert_eq!(m.option("version"), Some(&ArgValue::Boolean(true)));
        assert_eq!(m.arg("number"), Some(&ArgValue::Number(5.0)));

        assert!(test.parse("test -n").is_none(), "required option value");
        assert!(test.parse("test -n x").is_none(), "bad option value");
    }

    #[test]
    fn test_negative_number_is_positional() {
        let add = cmd("add <n:number>");
        assert_eq!(
            add.parse("add -5").unwrap().arg("n"),
            Some(&ArgValue::Number(-5.0))
        );
    }

    #[test]
    fn test_option_merge_by_name() {
        let c = cmd("x")
            .option("-n <n:number> first")
            .unwrap()
            .option("-m, --n <n:string> second")
            .unwrap();
        assert_eq!(c.options().len(), 1);
        assert_eq!(c.options()[0].help, "second");
    }

    #[test]
    fn test_alias_and_shortcut() {
        let status = cmd("status").alias("状态");
        assert!(status.parse("状态").is_some());

        let test = cmd("test [number:number]")
            .option("-b toggle")
            .unwrap()
            .option("-n <number:number> number")
            .unwrap()
            .shortcut(
                Shortcut::new(r"^输入数字(\d+)$")
                    .unwrap()
                    .arg("$1")
                    .option("number", "$1")
                    .option("b", "true"),
            );
        let m = test.parse("输入数字42").unwrap();
        assert_eq!(m.arg("number"), Some(&ArgValue::Number(42.0)));
        assert_eq!(m.option("number"), Some(&ArgValue::Number(42.0)));
        assert_eq!(m.option("b"), Some(&ArgValue::Boolean(true)));
        assert!(test.parse("输入数字x").is_none());
    }

    #[test]
    fn test_usage() {
        let c = cmd("plugin.install [name:string]")
            .option("-e [env:string] node env")
            .unwrap();
        assert_eq!(c.usage(), "plugin.install [name:string] [-e [env:string]]");
    }
}
