use crate::env::Environment;
use anyhow::Result;
use std::io::{self, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Exit codes of commands are informational only: the shell never turns them
/// into its own exit status.
pub type ExitCode = i32;

/// Abstraction over the writable stream command output goes to.
///
/// Besides being a [`Write`], the stream tells the process launcher whether a
/// child process can write to it directly.
pub trait Stdout: Write {
    /// Handle a spawned child should use as its standard output.
    ///
    /// `None` means the stream is not backed by a file descriptor; the child's
    /// output is then captured and copied through [`Write`].
    fn child_stdio(&self) -> Option<Stdio>;
}

impl Stdout for io::Stdout {
    fn child_stdio(&self) -> Option<Stdio> {
        Some(Stdio::inherit())
    }
}

impl Stdout for io::StdoutLock<'_> {
    fn child_stdio(&self) -> Option<Stdio> {
        Some(Stdio::inherit())
    }
}

impl Stdout for Vec<u8> {
    fn child_stdio(&self) -> Option<Stdio> {
        None
    }
}

/// Object-safe trait for any command that can be executed by the shell.
///
/// This is implemented by built-ins via a blanket impl and by external commands.
pub trait ExecutableCommand {
    /// Executes the command.
    ///
    /// Failures the user should know about are written to `stdout` and turned
    /// into a non-zero exit code; an `Err` means the output stream itself broke.
    fn execute(self: Box<Self>, stdout: &mut dyn Stdout, env: &mut Environment) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
/// Implementations can use the environment to resolve executables (e.g. the search directory).
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}
