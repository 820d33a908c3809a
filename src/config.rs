//! Tunables of a shell session.

use std::path::PathBuf;

/// Directory bare command names are resolved against.
pub const DEFAULT_SEARCH_DIR: &str = "/bin";
/// Prompt printed before every read.
pub const DEFAULT_PROMPT: &str = "rux> ";
/// Significant bytes of one input line.
pub const DEFAULT_MAX_LINE_LEN: usize = 255;
/// Argument vector slots, the trailing sentinel included.
pub const DEFAULT_MAX_ARGS: usize = 16;

/// What to do with an input line longer than [`ShellConfig::max_line_len`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthPolicy {
    /// Drop the line and tell the user.
    #[default]
    Reject,
    /// Cut the line down to the limit and tell the user.
    Truncate,
}

/// Session configuration, fixed for the lifetime of an [`Interpreter`](crate::Interpreter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub prompt: String,
    pub search_dir: PathBuf,
    pub max_line_len: usize,
    pub max_args: usize,
    pub long_lines: LengthPolicy,
    /// Print the startup banner when the loop starts.
    pub banner: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            search_dir: PathBuf::from(DEFAULT_SEARCH_DIR),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_args: DEFAULT_MAX_ARGS,
            long_lines: LengthPolicy::default(),
            banner: true,
        }
    }
}
