//! Quote- and escape-aware splitting of command lines into tokens.
//!
//! This is the lowest layer of the shell: both the flag parser and the pipe
//! executor are built on [`tokenize_with`]. Splitting is configurable through
//! [`TokenizeOptions`] so the same scanner can break a line on whitespace
//! (argument parsing) or on `|` (pipeline stages) while respecting quotes and
//! escapes in both cases.

/// The pipeline stage separator.
pub const PIPE: char = '|';
/// The escape character.
pub const ESCAPE: char = '\\';
/// The default quote character.
pub const DOUBLE_QUOTE: char = '"';

/// Configuration for [`tokenize_with`].
///
/// Defaults: split on spaces, treat `"` as the only quote character, strip
/// quotes from tokens and do not emit separator runs.
#[derive(Debug, Clone)]
pub struct TokenizeOptions {
    separator: char,
    quote_chars: Vec<char>,
    include_quotes: bool,
    include_separators: bool,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self {
            separator: ' ',
            quote_chars: vec![DOUBLE_QUOTE],
            include_quotes: false,
            include_separators: false,
        }
    }
}

impl TokenizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `separator` instead of the space character to split tokens.
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Replace the set of quote characters.
    pub fn quotes(mut self, quote_chars: &[char]) -> Self {
        self.quote_chars = quote_chars.to_vec();
        self
    }

    /// Keep quote characters in the emitted tokens.
    pub fn include_quotes(mut self, include: bool) -> Self {
        self.include_quotes = include;
        self
    }

    /// Emit each run of separator characters as a token of its own.
    pub fn include_separators(mut self, include: bool) -> Self {
        self.include_separators = include;
        self
    }
}

/// Split `line` into tokens, feeding each one to `on_token`.
///
/// The callback returns `true` to keep splitting or `false` to stop early, in
/// which case the unconsumed remainder of the line is returned verbatim. When
/// the whole line is consumed the returned remainder is empty.
///
/// Escaping rules: a backslash makes the following quote or separator
/// character literal (the backslash itself is dropped); before any other
/// character the backslash is kept as-is, and a trailing backslash is kept
/// too. Quote characters toggle quoting; inside quotes the separator has no
/// effect. Empty tokens are never produced, except that a separator run is
/// emitted as one token when `include_separators` is set.
pub fn tokenize_with<F>(line: &str, options: &TokenizeOptions, mut on_token: F) -> String
where
    F: FnMut(String) -> bool,
{
    let mut in_quote = false;
    let mut escaped = false;
    let mut in_separators = false;
    let mut current = String::new();

    for (index, c) in line.char_indices() {
        let after = index + c.len_utf8();
        let is_separator = c == options.separator;
        let is_quote = options.quote_chars.contains(&c);

        if escaped && !is_quote && !is_separator {
            // the escape was not used, put it back
            current.push(ESCAPE);
        }

        if c == ESCAPE {
            escaped = true;
            in_separators = false;
            continue;
        }

        if !escaped && is_quote {
            in_quote = !in_quote;
            in_separators = false;
            if options.include_quotes {
                current.push(c);
            }
            escaped = false;
            continue;
        }

        if in_quote {
            current.push(c);
        } else if !escaped && is_separator {
            if !in_separators && !emit(&mut current, &mut on_token) {
                return line[after..].to_string();
            }
            in_separators = true;
            if options.include_separators {
                current.push(c);
            }
        } else {
            if options.include_separators
                && in_separators
                && !emit(&mut current, &mut on_token)
            {
                return line[after..].to_string();
            }
            in_separators = false;
            current.push(c);
        }

        escaped = false;
    }

    if escaped {
        // don't throw away a trailing escape character
        current.push(ESCAPE);
    }

    emit(&mut current, &mut on_token);
    String::new()
}

/// Split the whole of `line` into tokens.
pub fn tokenize(line: &str, options: &TokenizeOptions) -> Vec<String> {
    let mut tokens = Vec::new();
    tokenize_with(line, options, |token| {
        tokens.push(token);
        true
    });
    tokens
}

/// Split at most `limit` tokens out of `line`; the unconsumed rest of the
/// line, if any, becomes the final element untouched.
pub fn tokenize_first(line: &str, options: &TokenizeOptions, limit: usize) -> Vec<String> {
    if limit < 2 {
        return if line.is_empty() {
            Vec::new()
        } else {
            vec![line.to_string()]
        };
    }

    let mut tokens = Vec::new();
    let max_split = limit - 1;
    let rest = tokenize_with(line, options, |token| {
        tokens.push(token);
        tokens.len() < max_split
    });
    if !rest.is_empty() {
        tokens.push(rest);
    }
    tokens
}

/// Index of the last unescaped occurrence of any of `chars` in `line`.
pub fn last_unescaped_index(line: &str, chars: &[char]) -> Option<usize> {
    line.char_indices()
        .rev()
        .find(|&(index, c)| chars.contains(&c) && !escaped_at(line, index))
        .map(|(index, _)| index)
}

/// Index of the last unescaped separator (space or pipe) in `line`, if any.
///
/// The completion driver uses this to find the offset where candidates should
/// be spliced into the buffer.
pub fn last_separator_index(line: &str) -> Option<usize> {
    last_unescaped_index(line, &[' ', PIPE])
}

fn escaped_at(line: &str, index: usize) -> bool {
    line[..index].chars().rev().take_while(|&c| c == ESCAPE).count() % 2 == 1
}

fn emit<F>(current: &mut String, on_token: &mut F) -> bool
where
    F: FnMut(String) -> bool,
{
    if current.is_empty() {
        true
    } else {
        on_token(std::mem::take(current))
    }
}
