//! An embeddable interactive command shell core.
//!
//! This crate provides the building blocks of a line-oriented shell without
//! any concrete commands of its own: a quote- and escape-aware [`tokens`]
//! module, a declarative flag grammar in [`args`], a completion-matcher tree
//! in [`completer`], command rewriting through [`modifier`]s, and a pipe
//! executor connecting independently registered commands.
//!
//! The main entry point is [`Shell`]: register [`command::Command`]
//! implementations and [`modifier::CommandModifier`]s on it, then feed it one
//! submitted line at a time with [`Shell::run_command`].

pub mod args;
pub mod command;
pub mod completer;
pub mod io_adapters;
pub mod modifier;
pub mod registry;
mod shell;
pub mod tokens;

/// Convenient re-export of the pipeline executor.
///
/// See [`Shell`] for the high-level API.
pub use shell::Shell;
