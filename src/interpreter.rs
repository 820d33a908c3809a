use crate::command::{CommandFactory, ExitCode, Stdout};
use crate::config::{LengthPolicy, ShellConfig};
use crate::env::Environment;
use crate::io_adapters::{EditorSource, LineSource, StreamSource};
use crate::lexer;
use log::{debug, error, info, warn};
use std::io::{self, IsTerminal, Write};
use thiserror::Error;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only support commands defined in this crate — BuiltinCommand and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Problems with an input line as a whole, found before it is tokenized.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("input line too long (more than {max} bytes)")]
    LineTooLong { max: usize },
}

/// Apply the session's length policy to a freshly read line.
///
/// `Ok` carries the line to execute; under [`LengthPolicy::Truncate`] it is cut
/// at the last character boundary within the limit.
fn bound_line(mut line: String, config: &ShellConfig) -> Result<String, InputError> {
    let max = config.max_line_len;
    if line.len() <= max {
        return Ok(line);
    }
    match config.long_lines {
        LengthPolicy::Reject => Err(InputError::LineTooLong { max }),
        LengthPolicy::Truncate => {
            let mut end = max;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            warn!("truncating {}-byte input line to {end} bytes", line.len());
            line.truncate(end);
            Ok(line)
        }
    }
}

/// The Rux command shell: a registry of commands plus the read-eval loop driving it.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried in order to create commands by name; the first factory that
/// recognizes a name wins. See [`Default`] for the factories included out of the box.
///
/// Example
/// ```
/// use rux_shell::Interpreter;
/// let mut sh = Interpreter::default();
/// let mut out = Vec::new();
/// let code = sh.run("echo", &["hello", "world"], &mut out).unwrap();
/// assert_eq!(code, 0);
/// assert_eq!(out, b"hello world\n");
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(config: ShellConfig, commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(config),
            commands,
        }
    }

    /// Create an interpreter with the default commands and the given configuration.
    pub fn with_config(config: ShellConfig) -> Self {
        Self::new(config, default_commands())
    }

    /// Append a factory. It is consulted after every factory already registered.
    pub fn register(&mut self, factory: Box<dyn CommandFactory>) {
        self.commands.push(factory);
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run a single command invocation by name with arguments.
    ///
    /// Returns the command's exit code or an error if no factory knows the
    /// command or the output stream fails.
    pub fn run(&mut self, name: &str, args: &[&str], stdout: &mut dyn Stdout) -> anyhow::Result<ExitCode> {
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, name, args) {
                return cmd.execute(stdout, &mut self.env);
            }
        }
        Err(anyhow::anyhow!("command not found: {}", name))
    }

    /// Tokenize and run one line of input.
    ///
    /// Blank lines do nothing. Lines with too many arguments are reported and
    /// not run.
    pub fn execute_line(&mut self, line: &str, stdout: &mut dyn Stdout) -> anyhow::Result<()> {
        let argv = match lexer::split_into_tokens(line, self.env.config.max_args) {
            Ok(argv) => argv,
            Err(e) => {
                writeln!(stdout, "rux: {e}")?;
                return Ok(());
            }
        };
        let Some(name) = argv.command() else {
            return Ok(());
        };
        let code = self.run(name, argv.args(), stdout)?;
        // Informational only; the shell's own status never reflects it.
        debug!("{name} finished with status {code}");
        Ok(())
    }

    /// The read-eval loop.
    ///
    /// Prompts, reads and executes lines from `source` until end of input or
    /// until `exit`/`quit` runs. Command failures are reported and absorbed;
    /// an unreadable input stream counts as end of input. The shell's exit
    /// status is always 0.
    pub fn run_loop(&mut self, source: &mut dyn LineSource, mut stdout: &mut dyn Stdout) -> ExitCode {
        if self.env.config.banner {
            if let Err(e) = print_banner(&mut stdout) {
                error!("failed to print banner: {e}");
            }
        }
        info!("shell session started");

        let prompt = self.env.config.prompt.clone();
        while !self.env.should_exit {
            let line = match source.read_line(&prompt, &mut stdout) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("end of input");
                    break;
                }
                Err(e) => {
                    error!("failed to read input: {e:#}");
                    break;
                }
            };

            let read_len = line.len();
            let result = match bound_line(line, &self.env.config) {
                Ok(line) => {
                    if line.len() < read_len {
                        if let Err(e) = writeln!(stdout, "rux: warning: input truncated to {} bytes", line.len()) {
                            error!("failed to print truncation warning: {e}");
                        }
                    }
                    self.execute_line(&line, stdout)
                }
                Err(e) => writeln!(stdout, "rux: {e}").map_err(Into::into),
            };
            if let Err(e) = result {
                error!("command failed: {e:#}");
            }
        }

        info!("shell session finished");
        0
    }

    /// Run the read-eval loop on the process's standard streams.
    ///
    /// A terminal gets a line editor with history; anything else (pipes,
    /// files) is read line by line.
    pub fn repl(&mut self) -> ExitCode {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        if stdin.is_terminal() {
            match EditorSource::new() {
                Ok(mut source) => return self.run_loop(&mut source, &mut stdout),
                Err(e) => warn!("line editor unavailable, reading plain lines: {e:#}"),
            }
        }
        let mut source = StreamSource::with_limit(stdin.lock(), self.env.config.max_line_len);
        self.run_loop(&mut source, &mut stdout)
    }
}

fn print_banner(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "========================================")?;
    writeln!(out, "  Rux OS Shell v{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "========================================")?;
    writeln!(out, "Type 'help' for available commands")?;
    writeln!(out)
}

/// The built-ins in dispatch order, followed by the external command launcher.
fn default_commands() -> Vec<Box<dyn CommandFactory>> {
    use crate::builtin::*;
    use crate::external::ExternalCommand;
    vec![
        Box::new(Factory::<Echo>::default()),
        Box::new(Factory::<Help>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Time>::default()),
        Box::new(Factory::<Pid>::default()),
        Box::new(Factory::<Ls>::default()),
        Box::new(Factory::<Cat>::default()),
        Box::new(Factory::<ExternalCommand>::default()),
    ]
}

impl Default for Interpreter {
    /// Create an interpreter with the default configuration and commands:
    /// - built-ins: `echo`, `help`, `exit`/`quit`, `time`, `pid`, `ls`, `cat`
    /// - external command launcher for everything else
    fn default() -> Self {
        Self::with_config(ShellConfig::default())
    }
}
