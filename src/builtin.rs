use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Stdout};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::Result;
use log::{debug, error};
use nix::dir::{Dir, Type};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::{getpid, getppid};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Bytes `cat` moves per read.
pub const CHUNK_SIZE: usize = 512;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are constructed straight from their argument tokens and executed
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized {
    /// Names the command answers to, e.g. `["exit", "quit"]`.
    fn names() -> &'static [&'static str];

    /// Builds the command from the tokens following its name.
    ///
    /// Builtins take their operands positionally and ignore surplus ones, so
    /// construction cannot fail.
    fn from_args(args: &[&str]) -> Self;

    /// Executes the command, writing to `stdout`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, mut stdout: &mut dyn Stdout, env: &mut Environment) -> Result<ExitCode> {
        match <T as BuiltinCommand>::execute(*self, &mut stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stdout, "{e}")?;
                Ok(1)
            }
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if T::names().contains(&name) {
            debug!("{name} is a builtin");
            Some(Box::new(T::from_args(args)))
        } else {
            None
        }
    }
}

/// Write the arguments to standard output, separated by single spaces and
/// followed by a newline. Options are not interpreted.
pub struct Echo {
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn names() -> &'static [&'static str] {
        &["echo"]
    }

    fn from_args(args: &[&str]) -> Self {
        Self {
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}

const HELP_TEXT: &str = "\
Available commands:
  echo <args>  - Print arguments
  help         - Show this help message
  ls [dir]     - List directory contents
  cat <file>   - Display file contents
  time         - Show current time
  pid          - Show process ID
  exit, quit   - Exit the shell
  <program>    - Execute external program
";

/// Print the list of available commands.
pub struct Help;

impl BuiltinCommand for Help {
    fn names() -> &'static [&'static str] {
        &["help"]
    }

    fn from_args(_args: &[&str]) -> Self {
        Help
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "Rux OS Shell v{}", env!("CARGO_PKG_VERSION"))?;
        writeln!(stdout, "{HELP_TEXT}")?;
        Ok(0)
    }
}

/// Leave the shell. Arguments are accepted and ignored.
pub struct Exit;

impl BuiltinCommand for Exit {
    fn names() -> &'static [&'static str] {
        &["exit", "quit"]
    }

    fn from_args(_args: &[&str]) -> Self {
        Exit
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "Goodbye!")?;
        env.request_exit();
        Ok(0)
    }
}

/// Print wall-clock time as seconds and microseconds since the epoch.
pub struct Time;

impl BuiltinCommand for Time {
    fn names() -> &'static [&'static str] {
        &["time"]
    }

    fn from_args(_args: &[&str]) -> Self {
        Time
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(now) => now,
            Err(e) => {
                writeln!(stdout, "time: clock is before the epoch: {e}")?;
                return Ok(1);
            }
        };
        writeln!(
            stdout,
            "Current time: {}.{:06} seconds since epoch",
            now.as_secs(),
            now.subsec_micros()
        )?;
        Ok(0)
    }
}

/// Print the shell's process id and its parent's.
pub struct Pid;

impl BuiltinCommand for Pid {
    fn names() -> &'static [&'static str] {
        &["pid"]
    }

    fn from_args(_args: &[&str]) -> Self {
        Pid
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "PID: {}", getpid())?;
        writeln!(stdout, "PPID: {}", getppid())?;
        Ok(0)
    }
}

/// Type of a directory entry as reported by the directory stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Regular,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    Unknown,
}

impl EntryKind {
    /// Single character `ls` prints in front of the name.
    pub fn indicator(self) -> char {
        match self {
            EntryKind::Directory => 'd',
            EntryKind::Regular => '-',
            EntryKind::Symlink => 'l',
            EntryKind::BlockDevice => 'b',
            EntryKind::CharDevice => 'c',
            EntryKind::Fifo => 'p',
            EntryKind::Socket => 's',
            EntryKind::Unknown => '?',
        }
    }
}

impl From<Option<Type>> for EntryKind {
    fn from(file_type: Option<Type>) -> Self {
        match file_type {
            Some(Type::Directory) => EntryKind::Directory,
            Some(Type::File) => EntryKind::Regular,
            Some(Type::Symlink) => EntryKind::Symlink,
            Some(Type::BlockDevice) => EntryKind::BlockDevice,
            Some(Type::CharacterDevice) => EntryKind::CharDevice,
            Some(Type::Fifo) => EntryKind::Fifo,
            Some(Type::Socket) => EntryKind::Socket,
            None => EntryKind::Unknown,
        }
    }
}

/// One entry of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl From<&nix::dir::Entry> for DirEntry {
    fn from(entry: &nix::dir::Entry) -> Self {
        Self {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind: entry.file_type().into(),
        }
    }
}

/// List the entries of a directory, `.` and `..` included.
pub struct Ls {
    /// Directory to list; the current directory when omitted.
    pub dir: Option<String>,
}

impl BuiltinCommand for Ls {
    fn names() -> &'static [&'static str] {
        &["ls"]
    }

    fn from_args(args: &[&str]) -> Self {
        Self {
            dir: args.first().map(|s| s.to_string()),
        }
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let path = self.dir.as_deref().unwrap_or(".");

        // The stream is closed when `dir` goes out of scope, on every path below.
        let mut dir = match Dir::open(
            path,
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        ) {
            Ok(dir) => dir,
            Err(errno) => {
                writeln!(
                    stdout,
                    "ls: cannot open directory '{path}': {}",
                    io::Error::from(errno)
                )?;
                return Ok(1);
            }
        };

        writeln!(stdout, "Contents of {path}:")?;
        for entry in dir.iter() {
            match entry {
                Ok(entry) => {
                    let entry = DirEntry::from(&entry);
                    writeln!(stdout, "  {} {}", entry.kind.indicator(), entry.name)?;
                }
                Err(errno) => {
                    writeln!(
                        stdout,
                        "ls: error reading directory '{path}': {}",
                        io::Error::from(errno)
                    )?;
                    return Ok(1);
                }
            }
        }
        Ok(0)
    }
}

/// Failure while copying a file to the output.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("read error: {0}")]
    Read(#[source] io::Error),
    #[error("write error: {0}")]
    Write(#[source] io::Error),
}

/// Copy `src` to `dst` in [`CHUNK_SIZE`] pieces, returning the bytes moved.
///
/// Every chunk is written out completely before the next read, so a read
/// failure leaves the output holding a prefix of the input.
pub fn copy_chunks(src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64, TransferError> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Read(e)),
        };
        write_fully(dst, &buf[..n]).map_err(TransferError::Write)?;
        total += n as u64;
    }
}

fn write_fully(dst: &mut dyn Write, mut chunk: &[u8]) -> io::Result<()> {
    while !chunk.is_empty() {
        match dst.write(chunk) {
            Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
            Ok(n) => chunk = &chunk[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Print a file to stdout.
pub struct Cat {
    pub file: Option<String>,
}

impl BuiltinCommand for Cat {
    fn names() -> &'static [&'static str] {
        &["cat"]
    }

    fn from_args(args: &[&str]) -> Self {
        Self {
            file: args.first().map(|s| s.to_string()),
        }
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let Some(path) = self.file.as_deref() else {
            writeln!(stdout, "cat: missing file operand")?;
            writeln!(stdout, "Usage: cat <filename>")?;
            return Ok(1);
        };

        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                writeln!(stdout, "cat: cannot open '{path}': {e}")?;
                return Ok(1);
            }
        };

        match copy_chunks(&mut file, stdout) {
            Ok(n) => {
                debug!("cat: copied {n} bytes from {path}");
                Ok(0)
            }
            Err(e @ TransferError::Read(_)) => {
                writeln!(stdout, "\ncat: {e}")?;
                Ok(1)
            }
            Err(e @ TransferError::Write(_)) => {
                // The stream just failed; the message is best effort.
                error!("cat: {path}: {e}");
                let _ = writeln!(stdout, "\ncat: {e}");
                Ok(1)
            }
        }
    }
}
