use std::collections::HashMap;
use std::sync::{Arc, Weak};

use anyhow::Result;
use argh::FromArgs;
use parking_lot::RwLock;
use regex::Regex;
use rustyline::Editor;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use pipeshell::Shell;
use pipeshell::args::ArgsSpec;
use pipeshell::command::{Command, Output, output_from};
use pipeshell::completer::{CompletionMatcher, TreeCompleter};
use pipeshell::modifier::CommandModifier;
use pipeshell::registry::CommandRegistry;
use pipeshell::tokens::{TokenizeOptions, tokenize_first};

/// Interactive pipeline shell.
#[derive(FromArgs)]
struct CliArgs {
    /// prompt text to display
    #[argh(option, default = "String::from(\"> \")")]
    prompt: String,
}

fn main() -> Result<()> {
    let args: CliArgs = argh::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let shell = Shell::new();
    register_builtins(&shell);

    let mut rl = Editor::<ShellHelper, DefaultHistory>::new()?;
    rl.set_helper(Some(ShellHelper { completer: shell.completer() }));

    let out = output_from(std::io::stdout());
    let err = output_from(std::io::stderr());

    loop {
        match rl.readline(&args.prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                shell.run_command(&line, out.clone(), err.clone());
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("Error: {error:?}");
                break;
            }
        }
    }

    Ok(())
}

fn register_builtins(shell: &Shell) {
    let aliases: Aliases = Arc::new(RwLock::new(HashMap::new()));

    shell.registry().register(Arc::new(HelpCommand {
        registry: Arc::downgrade(shell.registry()),
    }));
    shell.registry().register(Arc::new(AliasCommand {
        aliases: aliases.clone(),
        spec: AliasCommand::spec(),
    }));
    if let Some(modifier) = AliasModifier::new(aliases) {
        shell.modifiers().register(Arc::new(modifier));
    }
}

/// Bridges the shell completion tree into rustyline.
struct ShellHelper {
    completer: TreeCompleter,
}

impl Completer for ShellHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok(self.completer.complete(line, pos).unwrap_or((pos, Vec::new())))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}
impl Validator for ShellHelper {}
impl Helper for ShellHelper {}

/// Lists registered commands, or the usage of one command.
struct HelpCommand {
    registry: Weak<CommandRegistry>,
}

impl Command for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn usage(&self) -> String {
        "help [command]".to_string()
    }

    fn short_description(&self) -> String {
        "show available commands or the usage of one command".to_string()
    }

    fn execute(&self, line: &str, out: Output, err: Output) -> Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        let mut parts = tokenize_first(line, &TokenizeOptions::new(), 2).into_iter();
        let argument = parts.nth(1).map(|arg| arg.trim().to_string());

        match argument.filter(|arg| !arg.is_empty()) {
            Some(name) => match registry.resolve(&name) {
                Some(command) => {
                    let mut out = out.borrow_mut();
                    writeln!(out, "{}", command.usage())?;
                    writeln!(out, "  {}", command.short_description())?;
                }
                None => {
                    writeln!(err.borrow_mut(), "Command not found: {name}")?;
                }
            },
            None => {
                let mut out = out.borrow_mut();
                for command in registry.commands() {
                    writeln!(out, "{:<12} {}", command.name(), command.short_description())?;
                }
            }
        }
        Ok(())
    }

    fn completers(&self) -> Vec<CompletionMatcher> {
        let Some(registry) = self.registry.upgrade() else {
            return Vec::new();
        };
        registry
            .command_names()
            .into_iter()
            .map(CompletionMatcher::name)
            .collect()
    }
}

type Aliases = Arc<RwLock<HashMap<String, String>>>;

/// Defines, removes and lists command aliases.
///
/// `alias greet emit hello` makes `greet` expand to `emit hello`;
/// `alias -r greet` removes it again.
struct AliasCommand {
    aliases: Aliases,
    spec: ArgsSpec,
}

impl AliasCommand {
    fn spec() -> ArgsSpec {
        ArgsSpec::builder().accepts("-r").with_args(1).end().build()
    }
}

impl Command for AliasCommand {
    fn name(&self) -> &str {
        "alias"
    }

    fn usage(&self) -> String {
        "alias [-r <name>] [<name> <expansion>...]".to_string()
    }

    fn short_description(&self) -> String {
        "define or remove command aliases".to_string()
    }

    fn execute(&self, line: &str, out: Output, err: Output) -> Result<()> {
        let invocation = match self.spec.parse(line) {
            Ok(invocation) => invocation,
            Err(error) => {
                writeln!(err.borrow_mut(), "{error}")?;
                writeln!(err.borrow_mut(), "Usage: {}", self.usage())?;
                return Ok(());
            }
        };

        if let Some(name) = invocation.first_argument("-r") {
            if self.aliases.write().remove(name).is_none() {
                writeln!(err.borrow_mut(), "No such alias: {name}")?;
            }
            return Ok(());
        }

        match invocation.unprocessed_input().split_once(' ') {
            Some((name, expansion)) => {
                self.aliases
                    .write()
                    .insert(name.to_string(), expansion.trim().to_string());
            }
            None if invocation.unprocessed_input().is_empty() => {
                let mut out = out.borrow_mut();
                let aliases = self.aliases.read();
                let mut names: Vec<&String> = aliases.keys().collect();
                names.sort();
                for name in names {
                    writeln!(out, "{name} = {}", aliases[name])?;
                }
            }
            None => {
                writeln!(err.borrow_mut(), "Usage: {}", self.usage())?;
            }
        }
        Ok(())
    }

    fn completers(&self) -> Vec<CompletionMatcher> {
        vec![self.spec.completion_matcher()]
    }
}

/// Replaces the head word of a command with its alias expansion, keeping the
/// rest of the line intact.
struct AliasModifier {
    aliases: Aliases,
    head: Regex,
}

impl AliasModifier {
    fn new(aliases: Aliases) -> Option<Self> {
        let head = Regex::new(r"^\s*(\S+)(.*)$").ok()?;
        Some(Self { aliases, head })
    }
}

impl CommandModifier for AliasModifier {
    fn apply(&self, command: &str) -> Vec<String> {
        let Some(captures) = self.head.captures(command) else {
            return vec![command.to_string()];
        };
        match self.aliases.read().get(&captures[1]) {
            Some(expansion) => vec![format!("{expansion}{}", &captures[2])],
            None => vec![command.to_string()],
        }
    }

    // aliases resolve before any other rewriting
    fn priority(&self) -> i32 {
        20
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeshell::io_adapters::MemWriter;

    fn alias_setup() -> (Shell, Aliases) {
        let shell = Shell::new();
        let aliases: Aliases = Arc::new(RwLock::new(HashMap::new()));
        shell.registry().register(Arc::new(AliasCommand {
            aliases: aliases.clone(),
            spec: AliasCommand::spec(),
        }));
        if let Some(modifier) = AliasModifier::new(aliases.clone()) {
            shell.modifiers().register(Arc::new(modifier));
        }
        (shell, aliases)
    }

    fn run(shell: &Shell, line: &str) -> (String, String) {
        let (out, out_buf) = MemWriter::with_handle();
        let (err, err_buf) = MemWriter::with_handle();
        shell.run_command(line, out, err);
        let out = String::from_utf8_lossy(&out_buf.borrow()[..]).into_owned();
        let err = String::from_utf8_lossy(&err_buf.borrow()[..]).into_owned();
        (out, err)
    }

    #[test]
    fn test_alias_defines_and_modifier_rewrites() {
        let (shell, aliases) = alias_setup();
        let (_, err) = run(&shell, "alias greet help me");
        assert_eq!(err, "");
        assert_eq!(aliases.read().get("greet").map(String::as_str), Some("help me"));

        let modifier = AliasModifier::new(aliases).unwrap();
        assert_eq!(modifier.apply("greet now"), vec!["help me now"]);
        assert_eq!(modifier.apply("other"), vec!["other"]);
    }

    #[test]
    fn test_alias_removal() {
        let (shell, aliases) = alias_setup();
        run(&shell, "alias gone help");
        assert!(aliases.read().contains_key("gone"));

        let (_, err) = run(&shell, "alias -r gone");
        assert_eq!(err, "");
        assert!(!aliases.read().contains_key("gone"));

        let (_, err) = run(&shell, "alias -r gone");
        assert_eq!(err, "No such alias: gone\n");
    }

    #[test]
    fn test_alias_listing_is_sorted() {
        let (shell, _) = alias_setup();
        run(&shell, "alias b help");
        run(&shell, "alias a help");
        let (out, _) = run(&shell, "alias");
        assert_eq!(out, "a = help\nb = help\n");
    }

    #[test]
    fn test_help_lists_commands() {
        let shell = Shell::new();
        register_builtins(&shell);
        let (out, err) = run(&shell, "help");
        assert_eq!(err, "");
        assert!(out.contains("alias"));
        assert!(out.contains("help"));

        let (out, _) = run(&shell, "help alias");
        assert!(out.starts_with("alias ["));
    }

    #[test]
    fn test_help_completes_command_names() {
        let shell = Shell::new();
        register_builtins(&shell);
        let completer = shell.completer();
        let (index, candidates) = completer.complete("help al", 7).unwrap();
        assert_eq!(index, 5);
        assert_eq!(candidates, vec!["alias"]);
    }
}
