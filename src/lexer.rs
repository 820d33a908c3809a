//! Splitting of a raw command line into whitespace-delimited arguments.
//!
//! There is no quoting, escaping or comment syntax: every run of spaces, tabs
//! and newlines is a separator and everything else is part of a token.

use thiserror::Error;

/// Characters that separate tokens.
const DELIMITERS: [char; 3] = [' ', '\t', '\n'];

/// Errors that can occur while tokenizing a line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexingError {
    /// The line holds more tokens than the argument vector has room for.
    #[error("too many arguments ({count}, max {max})")]
    TooManyArguments { count: usize, max: usize },
}

/// Ordered arguments of one command, borrowed from the line they were cut from.
///
/// The vector is sized like an exec argument array: with a capacity of
/// `max_args` slots it holds at most `max_args - 1` tokens, and the slot right
/// after the last token is always empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgumentVector<'a> {
    tokens: Vec<&'a str>,
}

impl<'a> ArgumentVector<'a> {
    /// Number of tokens, not counting the sentinel slot.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The command name, i.e. the first token.
    pub fn command(&self) -> Option<&'a str> {
        self.tokens.first().copied()
    }

    /// Every token after the command name.
    pub fn args(&self) -> &[&'a str] {
        self.tokens.get(1..).unwrap_or(&[])
    }

    pub fn as_slice(&self) -> &[&'a str] {
        &self.tokens
    }

    /// Token at `index`. `get(self.len())` is the sentinel and always `None`.
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.tokens.get(index).copied()
    }

    /// Exec-style view of the vector: every token followed by one `None`.
    pub fn exec_slots(&self) -> impl Iterator<Item = Option<&'a str>> + '_ {
        self.tokens
            .iter()
            .map(|token| Some(*token))
            .chain(std::iter::once(None))
    }
}

/// Tokenizes `line` into at most `max_args - 1` arguments.
///
/// Leading blanks are skipped and a blank line gives an empty vector. A line
/// with more tokens than fit is rejected as a whole rather than cut short, so
/// a command never runs with silently dropped arguments.
pub fn split_into_tokens(line: &str, max_args: usize) -> Result<ArgumentVector<'_>, LexingError> {
    let capacity = max_args.saturating_sub(1);
    let rest = line.trim_start_matches([' ', '\t']);
    if rest.is_empty() {
        return Ok(ArgumentVector::default());
    }

    let tokens: Vec<&str> = rest
        .split(DELIMITERS)
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.len() > capacity {
        return Err(LexingError::TooManyArguments {
            count: tokens.len(),
            max: capacity,
        });
    }

    Ok(ArgumentVector { tokens })
}
