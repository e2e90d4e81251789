//! The shell core: splits a submitted line into pipeline stages, expands each
//! stage through the modifier chain, resolves commands against the registry
//! and executes the pipeline.
//!
//! Hookup runs last-to-first so that every stage already has its output sink
//! when the stage before it starts producing lines. A stage whose command can
//! stream receives upstream lines as they appear; otherwise its input is
//! buffered and the command runs once when the upstream stage is done.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::command::{Command, Output};
use crate::completer::{CompletionMatcher, TreeCompleter};
use crate::io_adapters::{BufferSink, SharedSinkWriter, SinkWriter, StreamSink};
use crate::modifier;
use crate::registry::{CommandRegistry, ModifierSet};
use crate::tokens::{PIPE, TokenizeOptions, tokenize, tokenize_first};

pub struct Shell {
    registry: Arc<CommandRegistry>,
    modifiers: Arc<ModifierSet>,
}

struct Resolved {
    invocation: String,
    command: Arc<dyn Command>,
}

impl Shell {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(CommandRegistry::new()),
            modifiers: Arc::new(ModifierSet::new()),
        }
    }

    pub fn with_parts(registry: Arc<CommandRegistry>, modifiers: Arc<ModifierSet>) -> Self {
        Self { registry, modifiers }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn modifiers(&self) -> &Arc<ModifierSet> {
        &self.modifiers
    }

    /// A completer over the live registry: the root level offers command
    /// names, each command contributes its own matchers below its name.
    pub fn completer(&self) -> TreeCompleter {
        let registry = self.registry.clone();
        TreeCompleter::with_provider(move || {
            registry
                .commands()
                .iter()
                .map(|command| {
                    CompletionMatcher::name_with_children(command.name(), command.completers())
                })
                .collect()
        })
    }

    /// Run one submitted line. Command and pipeline problems are written to
    /// `err`; the interpreter loop always proceeds to the next prompt.
    pub fn run_command(&self, line: &str, out: Output, err: Output) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        // quotes survive the pipe split so each stage can re-parse its own
        // arguments
        let pipe_options = TokenizeOptions::new().separator(PIPE).include_quotes(true);
        let stages = tokenize(line, &pipe_options);

        let modifiers = self.modifiers.snapshot();
        let mut expanded: Vec<Vec<String>> = Vec::new();
        for stage in &stages {
            match modifier::expand(stage.trim(), &modifiers) {
                Ok(commands) => {
                    let commands: Vec<String> = commands
                        .into_iter()
                        .filter(|command| !command.trim().is_empty())
                        .collect();
                    debug!(stage = %stage.trim(), count = commands.len(), "stage expanded");
                    if !commands.is_empty() {
                        expanded.push(commands);
                    }
                }
                Err(error) => {
                    let _ = writeln!(err.borrow_mut(), "{error}");
                    return;
                }
            }
        }

        // resolve everything up front; one unknown name aborts the whole line
        let mut pipeline: Vec<Vec<Resolved>> = Vec::new();
        for commands in expanded {
            let mut stage = Vec::new();
            for invocation in commands {
                let name = match tokenize_first(&invocation, &TokenizeOptions::new(), 2)
                    .into_iter()
                    .next()
                {
                    Some(name) => name,
                    None => continue,
                };
                match self.registry.resolve(&name) {
                    Some(command) => stage.push(Resolved { invocation, command }),
                    None => {
                        let _ = writeln!(err.borrow_mut(), "Command not found: {name}");
                        return;
                    }
                }
            }
            if !stage.is_empty() {
                pipeline.push(stage);
            }
        }

        let mut current_out = out;
        let mut current_writer: Option<SharedSinkWriter> = None;
        for (index, stage) in pipeline.iter().enumerate().rev() {
            let Some((last, rest)) = stage.split_last() else {
                continue;
            };

            // extra sub-commands a stage expanded into run right away, in
            // order, against the same stage output
            for resolved in rest {
                self.run_one(resolved, current_out.clone(), err.clone());
            }

            if index == 0 {
                // the head of the pipeline has no input to wait for
                self.run_one(last, current_out.clone(), err.clone());
                if let Some(writer) = current_writer.take() {
                    writer.borrow_mut().finish();
                }
            } else {
                let sink = match last.command.pipe(
                    &last.invocation,
                    current_out.clone(),
                    err.clone(),
                ) {
                    Some(callback) => StreamSink::new(callback, current_writer.take()),
                    None => BufferSink::new(
                        last.command.clone(),
                        last.invocation.clone(),
                        current_out.clone(),
                        err.clone(),
                        current_writer.take(),
                    ),
                };
                let writer = SinkWriter::new(sink);
                current_out = writer.clone();
                current_writer = Some(writer);
            }
        }
    }

    fn run_one(&self, resolved: &Resolved, out: Output, err: Output) {
        if let Err(error) = resolved.command.execute(&resolved.invocation, out, err.clone()) {
            warn!(command = %resolved.command.name(), "command failed: {error:#}");
            let _ = writeln!(err.borrow_mut(), "{error}");
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}
