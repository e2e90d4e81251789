//! Command modifiers rewrite a submitted command before it is resolved.
//!
//! A modifier sees the full text of one pipeline stage and returns any number
//! of replacement commands: one (possibly changed) to keep going, several to
//! fan the stage out, or none to drop it entirely. Expansion runs modifiers
//! in priority order and re-runs the whole chain for every extra command a
//! modifier produced.

use std::sync::Arc;

use thiserror::Error;

/// How many nested expansion passes one command may trigger before the shell
/// assumes the modifier chain cycles.
pub const MAX_EXPANSION_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpansionError {
    #[error("command expansion exceeded {} levels, giving up on: {command}", MAX_EXPANSION_DEPTH)]
    DepthExceeded { command: String },
}

/// Rewrites command text before resolution.
pub trait CommandModifier: Send + Sync {
    /// Replacement commands for `command`. Return the input unchanged to pass
    /// it through, an empty vec to reject it.
    fn apply(&self, command: &str) -> Vec<String>;

    /// Higher priority runs earlier. Ties keep registration order.
    fn priority(&self) -> i32 {
        10
    }
}

/// Expand `command` through `modifiers` (already in application order).
///
/// The first result of each modifier continues through the rest of the chain;
/// every extra result restarts a full pass of its own, recursively. An empty
/// result anywhere drops that branch without error.
pub fn expand(
    command: &str,
    modifiers: &[Arc<dyn CommandModifier>],
) -> Result<Vec<String>, ExpansionError> {
    expand_at(command, modifiers, 0)
}

fn expand_at(
    command: &str,
    modifiers: &[Arc<dyn CommandModifier>],
    depth: usize,
) -> Result<Vec<String>, ExpansionError> {
    if depth >= MAX_EXPANSION_DEPTH {
        return Err(ExpansionError::DepthExceeded { command: command.to_string() });
    }

    let mut current = command.to_string();
    let mut branched = Vec::new();
    for modifier in modifiers {
        let mut results = modifier.apply(&current);
        if results.is_empty() {
            return Ok(Vec::new());
        }
        current = results.remove(0);
        branched.extend(results);
    }

    let mut expanded = vec![current];
    for branch in branched {
        expanded.extend(expand_at(&branch, modifiers, depth + 1)?);
    }
    Ok(expanded)
}
