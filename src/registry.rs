//! Shared registries the shell resolves against.
//!
//! Commands and modifiers are registered and removed independently of the
//! interpreter loop, possibly from other threads. Reads take a snapshot under
//! the lock; the interpreter never observes a half-applied change, though a
//! registration may only be visible from the next submitted line.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::command::Command;
use crate::modifier::CommandModifier;

#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `command` under its own name, replacing any previous command
    /// with that name.
    pub fn register(&self, command: Arc<dyn Command>) {
        self.commands
            .write()
            .insert(command.name().to_string(), command);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.write().remove(name)
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.read().get(name).cloned()
    }

    /// Registered names, sorted for stable listings.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of all registered commands, sorted by name.
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        let mut commands: Vec<Arc<dyn Command>> =
            self.commands.read().values().cloned().collect();
        commands.sort_by(|a, b| a.name().cmp(b.name()));
        commands
    }
}

struct ModifierEntry {
    sequence: usize,
    modifier: Arc<dyn CommandModifier>,
}

/// Modifiers in application order: descending priority, registration order
/// within one priority.
#[derive(Default)]
pub struct ModifierSet {
    entries: RwLock<Vec<ModifierEntry>>,
}

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, modifier: Arc<dyn CommandModifier>) {
        let mut entries = self.entries.write();
        let sequence = entries.iter().map(|entry| entry.sequence + 1).max().unwrap_or(0);
        entries.push(ModifierEntry { sequence, modifier });
        entries.sort_by_key(|entry| (-entry.modifier.priority(), entry.sequence));
    }

    /// Snapshot in application order.
    pub fn snapshot(&self) -> Vec<Arc<dyn CommandModifier>> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.modifier.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
