//! Tab-completion as an explicit matcher tree.
//!
//! Each level of the tree describes the tokens that may appear at one
//! position of the command line. [`CompletionMatcher`] is the node type,
//! [`TreeCompleter`] walks a tree against the current editing buffer and
//! produces the candidates plus the offset at which they should be spliced
//! in. Children are resolved through a provider on every call, so a level can
//! be backed by live external state (for example the set of registered
//! commands).

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::tokens::{TokenizeOptions, last_separator_index, last_unescaped_index, tokenize};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatcherError {
    #[error("multi-part sections cannot have children of their own")]
    NestedParts,
}

/// The child matchers below a node, either a fixed list or a provider that is
/// queried fresh every time the node is descended into.
#[derive(Clone)]
pub enum Children {
    Fixed(Vec<CompletionMatcher>),
    Provided(Arc<dyn Fn() -> Vec<CompletionMatcher> + Send + Sync>),
}

impl Children {
    pub fn none() -> Self {
        Children::Fixed(Vec::new())
    }

    pub fn resolve(&self) -> Vec<CompletionMatcher> {
        match self {
            Children::Fixed(members) => members.clone(),
            Children::Provided(provider) => provider(),
        }
    }

    fn is_known_empty(&self) -> bool {
        match self {
            Children::Fixed(members) => members.is_empty(),
            Children::Provided(_) => false,
        }
    }
}

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Children::Fixed(members) => f.debug_tuple("Fixed").field(members).finish(),
            Children::Provided(_) => f.debug_tuple("Provided").finish(),
        }
    }
}

/// One node of the completion tree.
#[derive(Debug, Clone)]
pub enum CompletionMatcher {
    /// Matches one literal token.
    Name { name: String, children: Children },
    /// Matches a token assembled from sections joined by a separator
    /// character, e.g. `red+bold`. Sections must be leaf matchers.
    MultiPart {
        separator: char,
        parts: Vec<CompletionMatcher>,
        children: Children,
    },
    /// Matches whatever any of its members matches.
    Collection { members: Vec<CompletionMatcher> },
}

impl CompletionMatcher {
    pub fn name(name: impl Into<String>) -> Self {
        CompletionMatcher::Name {
            name: name.into(),
            children: Children::none(),
        }
    }

    pub fn name_with_children(name: impl Into<String>, children: Vec<CompletionMatcher>) -> Self {
        CompletionMatcher::Name {
            name: name.into(),
            children: Children::Fixed(children),
        }
    }

    pub fn name_with_provider<F>(name: impl Into<String>, provider: F) -> Self
    where
        F: Fn() -> Vec<CompletionMatcher> + Send + Sync + 'static,
    {
        CompletionMatcher::Name {
            name: name.into(),
            children: Children::Provided(Arc::new(provider)),
        }
    }

    pub fn collection(members: Vec<CompletionMatcher>) -> Self {
        CompletionMatcher::Collection { members }
    }

    /// Build a multi-part matcher. Section matchers must not carry children;
    /// only the assembled token as a whole can have a next level.
    pub fn multi_part(
        separator: char,
        parts: Vec<CompletionMatcher>,
        children: Vec<CompletionMatcher>,
    ) -> Result<Self, MatcherError> {
        if parts.iter().any(CompletionMatcher::has_children) {
            return Err(MatcherError::NestedParts);
        }
        Ok(CompletionMatcher::MultiPart {
            separator,
            parts,
            children: Children::Fixed(children),
        })
    }

    fn has_children(&self) -> bool {
        match self {
            CompletionMatcher::Name { children, .. }
            | CompletionMatcher::MultiPart { children, .. } => !children.is_known_empty(),
            CompletionMatcher::Collection { members } => {
                members.iter().any(CompletionMatcher::has_children)
            }
        }
    }

    /// Candidates this node offers for a partial token.
    pub fn completions_for(&self, partial: &str) -> Vec<String> {
        match self {
            CompletionMatcher::Name { name, .. } => {
                if name.starts_with(partial) {
                    vec![name.clone()]
                } else {
                    Vec::new()
                }
            }
            CompletionMatcher::MultiPart { separator, parts, children } => {
                let segments: Vec<&str> = partial.split(*separator).collect();
                if segments.len() > parts.len() {
                    return Vec::new();
                }
                let last = segments.len() - 1;
                let mut prefix = String::new();
                for (segment, part) in segments[..last].iter().zip(parts) {
                    if !part.fully_matched(segment) {
                        return Vec::new();
                    }
                    prefix.push_str(segment);
                    prefix.push(*separator);
                }
                let segment = segments[last];
                if !parts[last].fully_matched(segment) {
                    return parts[last]
                        .completions_for(segment)
                        .into_iter()
                        .map(|candidate| format!("{prefix}{candidate}"))
                        .collect();
                }
                // the segment is already complete: offer the next part, or
                // this node's children once every part is consumed
                match parts.get(last + 1) {
                    Some(next) => {
                        prefix.push_str(segment);
                        prefix.push(*separator);
                        next.completions_for("")
                            .into_iter()
                            .map(|candidate| format!("{prefix}{candidate}"))
                            .collect()
                    }
                    None => children
                        .resolve()
                        .iter()
                        .flat_map(|child| child.completions_for(""))
                        .collect(),
                }
            }
            CompletionMatcher::Collection { members } => members
                .iter()
                .flat_map(|member| member.completions_for(partial))
                .collect(),
        }
    }

    /// Whether `token` is one complete token this node accepts.
    pub fn fully_matched(&self, token: &str) -> bool {
        match self {
            CompletionMatcher::Name { name, .. } => name == token,
            CompletionMatcher::MultiPart { separator, parts, .. } => {
                let segments: Vec<&str> = token.split(*separator).collect();
                segments.len() == parts.len()
                    && segments
                        .iter()
                        .zip(parts)
                        .all(|(segment, part)| part.fully_matched(segment))
            }
            CompletionMatcher::Collection { members } => {
                members.iter().any(|member| member.fully_matched(token))
            }
        }
    }

    /// Whether `input` begins with a token this node accepts, followed by
    /// more text. A matcher only takes part in completing later words of a
    /// line when this holds; a multi-part node never does.
    pub fn partially_matches(&self, input: &str) -> bool {
        match self {
            CompletionMatcher::Name { name, .. } => input
                .strip_prefix(name.as_str())
                .is_some_and(|rest| rest.starts_with(' ')),
            CompletionMatcher::MultiPart { .. } => false,
            CompletionMatcher::Collection { members } => {
                members.iter().any(|member| member.partially_matches(input))
            }
        }
    }

    /// The next level below this node once `token` fully matched it.
    fn children_for(&self, token: &str) -> Vec<CompletionMatcher> {
        match self {
            CompletionMatcher::Name { children, .. }
            | CompletionMatcher::MultiPart { children, .. } => {
                if self.fully_matched(token) {
                    children.resolve()
                } else {
                    Vec::new()
                }
            }
            CompletionMatcher::Collection { members } => members
                .iter()
                .flat_map(|member| member.children_for(token))
                .collect(),
        }
    }
}

/// Walks a matcher tree against the editing buffer.
pub struct TreeCompleter {
    roots: Children,
}

impl TreeCompleter {
    pub fn new(matchers: Vec<CompletionMatcher>) -> Self {
        Self { roots: Children::Fixed(matchers) }
    }

    /// Root matchers come from a provider, re-queried on every completion
    /// request.
    pub fn with_provider<F>(provider: F) -> Self
    where
        F: Fn() -> Vec<CompletionMatcher> + Send + Sync + 'static,
    {
        Self { roots: Children::Provided(Arc::new(provider)) }
    }

    /// Complete `buffer` at byte offset `cursor`.
    ///
    /// Returns the offset at which every candidate should replace the buffer
    /// tail, and the candidates in declaration order. `None` means nothing
    /// matched.
    pub fn complete(&self, buffer: &str, cursor: usize) -> Option<(usize, Vec<String>)> {
        self.complete_with_context(buffer, cursor, "")
    }

    /// Like [`TreeCompleter::complete`], with `context` virtually prepended
    /// to the buffer while matching. The returned offset stays relative to
    /// `buffer`.
    pub fn complete_with_context(
        &self,
        buffer: &str,
        cursor: usize,
        context: &str,
    ) -> Option<(usize, Vec<String>)> {
        let head = buffer.get(..cursor).unwrap_or(buffer);
        let effective = format!("{context}{head}");

        // completion restarts at the root for each pipeline stage
        let stage = match last_unescaped_index(&effective, &['|']) {
            Some(index) => &effective[index + 1..],
            None => effective.as_str(),
        };

        let mut tokens = tokenize(stage, &TokenizeOptions::new());
        let ends_in_separator =
            last_unescaped_index(stage, &[' ']) == Some(stage.len().saturating_sub(1))
                && !stage.is_empty();
        let partial = if ends_in_separator {
            String::new()
        } else {
            tokens.pop().unwrap_or_default()
        };

        let mut level = self.roots.resolve();
        // past the first word, a root only takes part when it can match the
        // head of the stage
        if !tokens.is_empty() {
            level.retain(|matcher| matcher.partially_matches(stage));
        }
        for token in &tokens {
            let next: Vec<CompletionMatcher> = level
                .iter()
                .flat_map(|matcher| matcher.children_for(token))
                .collect();
            if next.is_empty() {
                return None;
            }
            level = next;
        }

        let mut candidates: Vec<String> = Vec::new();
        for matcher in &level {
            for candidate in matcher.completions_for(&partial) {
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }

        if candidates.is_empty() {
            return None;
        }
        let index = last_separator_index(head).map_or(0, |at| at + 1);
        Some((index, candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn color_style() -> CompletionMatcher {
        let colors = CompletionMatcher::collection(vec![
            CompletionMatcher::name("red"),
            CompletionMatcher::name("green"),
        ]);
        let styles = CompletionMatcher::collection(vec![
            CompletionMatcher::name("bold"),
            CompletionMatcher::name("italic"),
        ]);
        CompletionMatcher::multi_part('+', vec![colors, styles], vec![]).unwrap()
    }

    #[test]
    fn test_name_prefix_completion() {
        let matcher = CompletionMatcher::name("clear");
        assert_eq!(matcher.completions_for("cl"), vec!["clear"]);
        assert_eq!(matcher.completions_for(""), vec!["clear"]);
        assert!(matcher.completions_for("cle4").is_empty());
        assert!(matcher.fully_matched("clear"));
        assert!(!matcher.fully_matched("cle"));
    }

    #[test]
    fn test_partially_matches_requires_trailing_separator() {
        let matcher = CompletionMatcher::name("clear");
        assert!(matcher.partially_matches("clear something"));
        assert!(matcher.partially_matches("clear "));
        assert!(!matcher.partially_matches("clear"));
        assert!(!matcher.partially_matches("clearx y"));

        let collection = CompletionMatcher::collection(vec![matcher]);
        assert!(collection.partially_matches("clear all"));
        assert!(!collection.partially_matches("other all"));

        // a multi-part node never anchors a longer command
        assert!(!color_style().partially_matches("red+bold x"));
    }

    #[test]
    fn test_multi_part_completion() {
        let matcher = color_style();
        assert_eq!(matcher.completions_for("gr"), vec!["green"]);
        assert_eq!(matcher.completions_for("red+b"), vec!["red+bold"]);
        assert_eq!(matcher.completions_for("red+"), vec!["red+bold", "red+italic"]);
        assert!(matcher.completions_for("blue+b").is_empty());
        assert!(matcher.completions_for("red+bold+x").is_empty());
    }

    #[test]
    fn test_multi_part_completed_part_advances_to_the_next() {
        // a fully entered part continues into the next one even without a
        // trailing separator
        let matcher = color_style();
        assert_eq!(matcher.completions_for("red"), vec!["red+bold", "red+italic"]);
        assert_eq!(matcher.completions_for("green"), vec!["green+bold", "green+italic"]);
    }

    #[test]
    fn test_multi_part_completed_token_defers_to_children() {
        let without_children = color_style();
        assert!(without_children.completions_for("red+bold").is_empty());

        let colors = CompletionMatcher::collection(vec![
            CompletionMatcher::name("red"),
            CompletionMatcher::name("green"),
        ]);
        let styles = CompletionMatcher::collection(vec![
            CompletionMatcher::name("bold"),
            CompletionMatcher::name("italic"),
        ]);
        let with_children = CompletionMatcher::multi_part(
            '+',
            vec![colors, styles],
            vec![CompletionMatcher::name("shine")],
        )
        .unwrap();
        assert_eq!(with_children.completions_for("red+bold"), vec!["shine"]);
    }

    #[test]
    fn test_multi_part_full_match() {
        let matcher = color_style();
        assert!(matcher.fully_matched("green+italic"));
        assert!(!matcher.fully_matched("green"));
        assert!(!matcher.fully_matched("green+nope"));
    }

    #[test]
    fn test_multi_part_rejects_sections_with_children() {
        let part = CompletionMatcher::name_with_children("red", vec![CompletionMatcher::name("x")]);
        let error = CompletionMatcher::multi_part('+', vec![part], vec![]).unwrap_err();
        assert_eq!(error, MatcherError::NestedParts);
    }

    fn tree() -> TreeCompleter {
        TreeCompleter::new(vec![
            CompletionMatcher::name_with_children(
                "color",
                vec![CompletionMatcher::name("red"), CompletionMatcher::name("reset")],
            ),
            CompletionMatcher::name("clear"),
        ])
    }

    #[test]
    fn test_completes_first_word_from_roots() {
        let (index, candidates) = tree().complete("c", 1).unwrap();
        assert_eq!(index, 0);
        assert_eq!(candidates, vec!["color", "clear"]);
    }

    #[test]
    fn test_completes_second_word_below_matched_root() {
        let (index, candidates) = tree().complete("color re", 8).unwrap();
        assert_eq!(index, 6);
        assert_eq!(candidates, vec!["red", "reset"]);
    }

    #[test]
    fn test_unmatched_first_word_yields_nothing() {
        assert!(tree().complete("paint re", 8).is_none());
    }

    #[test]
    fn test_trailing_space_completes_next_level() {
        let (index, candidates) = tree().complete("color ", 6).unwrap();
        assert_eq!(index, 6);
        assert_eq!(candidates, vec!["red", "reset"]);
    }

    #[test]
    fn test_completion_only_considers_text_before_cursor() {
        let (index, candidates) = tree().complete("col and more", 3).unwrap();
        assert_eq!(index, 0);
        assert_eq!(candidates, vec!["color"]);
    }

    #[test]
    fn test_completion_restarts_after_pipe() {
        let (index, candidates) = tree().complete("clear | col", 11).unwrap();
        assert_eq!(index, 8);
        assert_eq!(candidates, vec!["color"]);
    }

    #[test]
    fn test_context_prefix_is_matched_but_not_replaced() {
        let (index, candidates) = tree()
            .complete_with_context("re", 2, "color ")
            .unwrap();
        assert_eq!(index, 0);
        assert_eq!(candidates, vec!["red", "reset"]);
    }

    #[test]
    fn test_multi_part_root_is_not_walked_past_its_token() {
        let completer = TreeCompleter::new(vec![
            CompletionMatcher::multi_part(
                '+',
                vec![CompletionMatcher::name("red"), CompletionMatcher::name("bold")],
                vec![CompletionMatcher::name("after")],
            )
            .unwrap(),
        ]);
        let (_, candidates) = completer.complete("red+", 4).unwrap();
        assert_eq!(candidates, vec!["red+bold"]);
        // the node completes within its own token but does not anchor a
        // longer command
        assert!(completer.complete("red+bold af", 11).is_none());
    }

    #[test]
    fn test_provided_children_are_queried_fresh() {
        let names = std::sync::Arc::new(Mutex::new(vec!["one".to_string()]));
        let source = names.clone();
        let completer = TreeCompleter::with_provider(move || {
            source
                .lock()
                .unwrap()
                .iter()
                .map(CompletionMatcher::name)
                .collect()
        });

        let (_, candidates) = completer.complete("o", 1).unwrap();
        assert_eq!(candidates, vec!["one"]);

        names.lock().unwrap().push("onward".to_string());
        let (_, candidates) = completer.complete("o", 1).unwrap();
        assert_eq!(candidates, vec!["one", "onward"]);
    }

    #[test]
    fn test_duplicate_candidates_collapse() {
        let completer = TreeCompleter::new(vec![
            CompletionMatcher::name("stop"),
            CompletionMatcher::name("stop"),
            CompletionMatcher::name("status"),
        ]);
        let (_, candidates) = completer.complete("st", 2).unwrap();
        assert_eq!(candidates, vec!["stop", "status"]);
    }
}
