//! Declarative flag grammar for commands.
//!
//! A command declares the options it accepts once, with [`ArgsSpec::builder`],
//! and then parses every invocation line through [`ArgsSpec::parse`]. The
//! result is an [`Invocation`]: parsed options up front, everything the
//! grammar did not recognize preserved as `unprocessed_input` for the command
//! to interpret itself.

use std::collections::HashMap;

use thiserror::Error;

use crate::completer::CompletionMatcher;
use crate::tokens::{TokenizeOptions, tokenize_first, tokenize_with};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("duplicate option: {flag}")]
    Duplicate { flag: String },
    #[error("option {flag} takes at least {min} argument(s), got {got}")]
    MissingArguments { flag: String, min: usize, got: usize },
    #[error("missing mandatory option(s): {}", .flags.join(", "))]
    MissingMandatory { flags: Vec<String> },
}

#[derive(Debug, Clone)]
struct OptionSpec {
    key: String,
    min_args: usize,
    max_args: usize,
    mandatory: bool,
    allow_multiple: bool,
}

/// The flag grammar of a command.
#[derive(Debug, Clone, Default)]
pub struct ArgsSpec {
    options: Vec<OptionSpec>,
}

pub struct ArgsSpecBuilder {
    options: Vec<OptionSpec>,
}

/// Builder for one option inside an [`ArgsSpecBuilder`] chain.
pub struct OptionBuilder {
    spec: ArgsSpecBuilder,
    option: OptionSpec,
}

impl ArgsSpec {
    pub fn builder() -> ArgsSpecBuilder {
        ArgsSpecBuilder { options: Vec::new() }
    }

    /// Declared option keys, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|option| option.key.as_str())
    }

    /// One-line usage text, e.g. `-f <arg> [-v]`.
    pub fn usage(&self) -> String {
        let parts: Vec<String> = self
            .options
            .iter()
            .map(|option| {
                let mut part = option.key.clone();
                for _ in 0..option.min_args {
                    part.push_str(" <arg>");
                }
                if option.max_args > option.min_args {
                    part.push_str(" [<arg>]");
                }
                let mut part = if option.mandatory {
                    part
                } else {
                    format!("[{part}]")
                };
                if option.allow_multiple {
                    part.push_str("...");
                }
                part
            })
            .collect();
        parts.join(" ")
    }

    /// A matcher collection completing the declared option keys, in
    /// declaration order.
    pub fn completion_matcher(&self) -> CompletionMatcher {
        CompletionMatcher::collection(
            self.keys().map(CompletionMatcher::name).collect(),
        )
    }

    /// Parse a full invocation line (leading command name included).
    pub fn parse(&self, line: &str) -> Result<Invocation, ArgsError> {
        let tokenize_options = TokenizeOptions::new();
        let mut rest = tokenize_first(line, &tokenize_options, 2);
        let arguments = if rest.len() > 1 { rest.remove(1) } else { String::new() };

        let mut parsed = Parsed {
            spec: self,
            options: HashMap::new(),
            open: None,
            error: None,
            aborted: None,
        };

        let remainder = tokenize_with(&arguments, &tokenize_options, |token| {
            parsed.take(token)
        });

        if let Some(error) = parsed.error.take() {
            return Err(error);
        }
        parsed.close_open()?;

        let missing: Vec<String> = self
            .options
            .iter()
            .filter(|option| option.mandatory && !parsed.options.contains_key(&option.key))
            .map(|option| option.key.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ArgsError::MissingMandatory { flags: missing });
        }

        let unprocessed_input = match parsed.aborted {
            Some(token) if remainder.is_empty() => token,
            Some(token) => format!("{token} {remainder}"),
            None => String::new(),
        };

        Ok(Invocation {
            options: parsed.options,
            unprocessed_input,
        })
    }

    fn find(&self, key: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|option| option.key == key)
    }
}

impl ArgsSpecBuilder {
    /// Start declaring an option with the given key.
    pub fn accepts(self, key: impl Into<String>) -> OptionBuilder {
        OptionBuilder {
            spec: self,
            option: OptionSpec {
                key: key.into(),
                min_args: 0,
                max_args: 0,
                mandatory: false,
                allow_multiple: false,
            },
        }
    }

    pub fn build(self) -> ArgsSpec {
        ArgsSpec { options: self.options }
    }
}

impl OptionBuilder {
    /// The option takes between `min` and `max` arguments.
    pub fn with_arg_count(mut self, min: usize, max: usize) -> Self {
        self.option.min_args = min;
        self.option.max_args = max;
        self
    }

    /// The option takes exactly `count` arguments.
    pub fn with_args(self, count: usize) -> Self {
        self.with_arg_count(count, count)
    }

    pub fn mandatory(mut self) -> Self {
        self.option.mandatory = true;
        self
    }

    pub fn allow_multiple(mut self) -> Self {
        self.option.allow_multiple = true;
        self
    }

    /// Finish this option and return to the grammar builder.
    ///
    /// Panics when the declared arity is inconsistent; a grammar is authored
    /// once, at command construction time.
    pub fn end(mut self) -> ArgsSpecBuilder {
        assert!(
            self.option.min_args <= self.option.max_args,
            "option {}: min_args ({}) exceeds max_args ({})",
            self.option.key,
            self.option.min_args,
            self.option.max_args,
        );
        self.spec.options.push(self.option);
        self.spec
    }
}

/// A parsed invocation line.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    options: HashMap<String, Vec<Vec<String>>>,
    unprocessed_input: String,
}

impl Invocation {
    pub fn has_flag(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    pub fn occurrences_of(&self, key: &str) -> usize {
        self.options.get(key).map_or(0, Vec::len)
    }

    /// First argument of the first occurrence of `key`.
    pub fn first_argument(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)?
            .first()?
            .first()
            .map(String::as_str)
    }

    /// All arguments of `key` across occurrences, in the order given.
    pub fn arguments_of(&self, key: &str) -> Vec<&str> {
        self.options
            .get(key)
            .into_iter()
            .flatten()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// The unrecognized tail of the line, exactly as the user wrote it from
    /// the first token the grammar did not cover.
    pub fn unprocessed_input(&self) -> &str {
        &self.unprocessed_input
    }
}

struct Parsed<'a> {
    spec: &'a ArgsSpec,
    options: HashMap<String, Vec<Vec<String>>>,
    open: Option<(String, Vec<String>)>,
    error: Option<ArgsError>,
    aborted: Option<String>,
}

impl Parsed<'_> {
    fn take(&mut self, token: String) -> bool {
        if let Some((key, args)) = &mut self.open {
            let option = match self.spec.find(key) {
                Some(option) => option,
                None => return false,
            };
            // below the minimum, anything is an argument, even a flag key
            let wants_more = args.len() < option.min_args
                || (args.len() < option.max_args && self.spec.find(&token).is_none());
            if wants_more {
                args.push(token);
                if args.len() == option.max_args {
                    let (key, args) = match self.open.take() {
                        Some(open) => open,
                        None => return false,
                    };
                    self.options.entry(key).or_default().push(args);
                }
                return true;
            }
        }

        match self.spec.find(&token) {
            Some(option) => {
                if let Err(error) = self.close_open() {
                    self.error = Some(error);
                    return false;
                }
                if self.options.contains_key(&option.key) && !option.allow_multiple {
                    self.error = Some(ArgsError::Duplicate { flag: option.key.clone() });
                    return false;
                }
                if option.max_args > 0 {
                    self.open = Some((option.key.clone(), Vec::new()));
                } else {
                    self.options.entry(option.key.clone()).or_default().push(Vec::new());
                }
                true
            }
            None => {
                if let Err(error) = self.close_open() {
                    self.error = Some(error);
                } else {
                    self.aborted = Some(token);
                }
                false
            }
        }
    }

    fn close_open(&mut self) -> Result<(), ArgsError> {
        if let Some((key, args)) = self.open.take() {
            if let Some(option) = self.spec.find(&key)
                && args.len() < option.min_args
            {
                return Err(ArgsError::MissingArguments {
                    flag: key,
                    min: option.min_args,
                    got: args.len(),
                });
            }
            self.options.entry(key).or_default().push(args);
        }
        Ok(())
    }
}
