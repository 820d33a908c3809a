//! The Rux userspace command shell.
//!
//! This crate reads command lines, runs a handful of built-in commands in
//! process (`echo`, `help`, `exit`/`quit`, `time`, `pid`, `ls`, `cat`) and
//! launches everything else as an external program found under a fixed search
//! directory, waiting for it before the next prompt. There are no pipes,
//! redirections, job control or variables.
//!
//! The main entry point is [`Interpreter`], which dispatches command names to a
//! list of pluggable factories and drives the read-eval loop. The public modules
//! [`command`] and [`env`] expose traits and types for implementing your own
//! commands, [`config`] holds the session tunables and [`io_adapters`] the line
//! sources the loop can read from.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
mod external;
mod interpreter;
pub mod io_adapters;
pub mod lexer;

pub use builtin::{CHUNK_SIZE, DirEntry, EntryKind, TransferError, copy_chunks};
pub use config::{LengthPolicy, ShellConfig};
pub use external::{LaunchError, MAX_PATH_LEN, ResolvedPath, resolve_command_path};
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{InputError, Interpreter};
