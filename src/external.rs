use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Stdout};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::Result;
use log::{debug, info, warn};
use nix::libc;
use std::borrow::Cow;
use std::ffi::OsString;
use std::io::{self, ErrorKind, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

/// Longest executable path the launcher accepts, in bytes.
pub const MAX_PATH_LEN: usize = 255;

/// Exit code reported for a command that could not be started.
const NOT_EXECUTED: ExitCode = 127;

/// Executable path a command name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// Wraps `path`, cutting it down to [`MAX_PATH_LEN`] bytes.
    fn bounded(mut path: String) -> Self {
        if path.len() > MAX_PATH_LEN {
            let mut end = MAX_PATH_LEN;
            while !path.is_char_boundary(end) {
                end -= 1;
            }
            warn!(
                "command path is {} bytes, truncating to {end}: {path}",
                path.len()
            );
            path.truncate(end);
        }
        Self(PathBuf::from(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// The path handed to the OS for execution.
    ///
    /// A verbatim name with no `/` in it (`.tool`, `..prog`) names a file in the
    /// current directory. It gets a `./` prefix so the launcher never searches
    /// for it.
    fn program(&self) -> Cow<'_, Path> {
        if self.0.as_os_str().as_bytes().contains(&b'/') {
            Cow::Borrowed(&self.0)
        } else {
            Cow::Owned(Path::new(".").join(&self.0))
        }
    }
}

/// Resolve a command name the way the Rux shell does.
///
/// Behavior:
/// - Name starting with `/` or `.`: used verbatim (absolute, `./foo`, `../foo`,
///   `.foo`), relative names against the current directory.
/// - Anything else: `<search_dir>/<name>`. There is no multi-directory search.
///
/// Nothing is checked against the filesystem; a missing program shows up when
/// it is executed.
pub fn resolve_command_path(search_dir: &Path, name: &str) -> ResolvedPath {
    if name.starts_with('/') || name.starts_with('.') {
        return ResolvedPath::bounded(name.to_string());
    }
    let dir = search_dir.to_string_lossy();
    ResolvedPath::bounded(format!("{}/{}", dir.trim_end_matches('/'), name))
}

/// Ways launching an external program can fail.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The child was created but could not replace its image.
    #[error("execve failed: {}: {source}", path.display())]
    Exec { path: PathBuf, source: io::Error },
    /// No child could be created.
    #[error("fork failed: {0}")]
    Spawn(#[source] io::Error),
    #[error("wait failed: {0}")]
    Wait(#[source] io::Error),
    #[error("failed to forward program output: {0}")]
    Forward(#[source] io::Error),
}

impl LaunchError {
    fn from_spawn(path: &Path, err: io::Error) -> Self {
        let exec_failure = matches!(
            err.kind(),
            ErrorKind::NotFound | ErrorKind::PermissionDenied
        ) || matches!(
            err.raw_os_error(),
            Some(libc::ENOEXEC | libc::ENOTDIR | libc::ELOOP | libc::ENAMETOOLONG)
        );
        if exec_failure {
            LaunchError::Exec {
                path: path.to_path_buf(),
                source: err,
            }
        } else {
            LaunchError::Spawn(err)
        }
    }
}

/// Command that is not a builtin.
pub struct ExternalCommand {
    path: ResolvedPath,
    /// What the program sees as `argv[0]`: the name as the user typed it.
    name: OsString,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(path: ResolvedPath, name: OsString, args: Vec<OsString>) -> Self {
        Self { path, name, args }
    }

    /// Runs the program to completion.
    ///
    /// Exactly one child is spawned and it is waited for exactly once before
    /// this returns. The child gets an empty environment and inherits stdin
    /// and stderr.
    pub fn launch(&self, stdout: &mut dyn Stdout) -> Result<ExitStatus, LaunchError> {
        let path = self.path.as_path();
        let mut cmd = Command::new(self.path.program().as_os_str());
        cmd.arg0(&self.name)
            .args(&self.args)
            .env_clear()
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit());

        match stdout.child_stdio() {
            Some(stdio) => {
                stdout.flush().map_err(LaunchError::Forward)?;
                let mut child = cmd
                    .stdout(stdio)
                    .spawn()
                    .map_err(|e| LaunchError::from_spawn(path, e))?;
                info!("started {} as pid {}", path.display(), child.id());
                child.wait().map_err(LaunchError::Wait)
            }
            None => {
                let child = cmd
                    .stdout(Stdio::piped())
                    .spawn()
                    .map_err(|e| LaunchError::from_spawn(path, e))?;
                info!("started {} as pid {} (captured)", path.display(), child.id());
                let output = child.wait_with_output().map_err(LaunchError::Wait)?;
                stdout
                    .write_all(&output.stdout)
                    .map_err(LaunchError::Forward)?;
                Ok(output.status)
            }
        }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let path = resolve_command_path(&env.config.search_dir, name);
        debug!("{name} resolved to {}", path.as_path().display());
        Some(Box::new(ExternalCommand::new(
            path,
            name.into(),
            args.iter().map(|x| x.into()).collect(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(self: Box<Self>, stdout: &mut dyn Stdout, _env: &mut Environment) -> Result<ExitCode> {
        match self.launch(stdout) {
            Ok(status) => {
                let code = exit_code(status);
                debug!("{} exited with {code}", self.path.as_path().display());
                Ok(code)
            }
            Err(e) => {
                writeln!(stdout, "{e}")?;
                Ok(NOT_EXECUTED)
            }
        }
    }
}

fn exit_code(exit_status: ExitStatus) -> ExitCode {
    match exit_status.code() {
        Some(x) => x,
        None => terminated_by_signal(exit_status),
    }
}

fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::default()
    }

    #[test]
    fn bare_name_goes_to_search_dir() {
        let path = resolve_command_path(Path::new("/bin"), "hello_world");
        assert_eq!(path.as_path(), Path::new("/bin/hello_world"));
    }

    #[test]
    fn search_dir_trailing_slash_is_not_doubled() {
        let path = resolve_command_path(Path::new("/opt/bin/"), "tool");
        assert_eq!(path.as_path(), Path::new("/opt/bin/tool"));
        let path = resolve_command_path(Path::new("/"), "tool");
        assert_eq!(path.as_path(), Path::new("/tool"));
    }

    #[test]
    fn absolute_and_relative_are_verbatim() {
        for name in ["/usr/bin/env", "./prog", "../prog", ".hidden"] {
            let path = resolve_command_path(Path::new("/bin"), name);
            assert_eq!(path.as_path(), Path::new(name));
        }
    }

    #[test]
    fn nested_bare_name_stays_under_search_dir() {
        let path = resolve_command_path(Path::new("/bin"), "sub/prog");
        assert_eq!(path.as_path(), Path::new("/bin/sub/prog"));
    }

    #[test]
    fn slashless_verbatim_name_is_run_from_current_dir() {
        let path = resolve_command_path(Path::new("/bin"), ".tool");
        assert_eq!(path.program(), Path::new("./.tool"));
        let path = resolve_command_path(Path::new("/bin"), "..prog");
        assert_eq!(path.program(), Path::new("./..prog"));
        let path = resolve_command_path(Path::new("/bin"), "./prog");
        assert_eq!(path.program(), Path::new("./prog"));
        let path = resolve_command_path(Path::new("/bin"), "ls");
        assert_eq!(path.program(), Path::new("/bin/ls"));
    }

    #[test]
    fn overlong_path_is_truncated() {
        let name = format!("/{}", "a".repeat(400));
        let path = resolve_command_path(Path::new("/bin"), &name);
        assert_eq!(path.as_path().as_os_str().len(), MAX_PATH_LEN);

        let synthesized = resolve_command_path(Path::new("/bin"), &"b".repeat(300));
        assert_eq!(synthesized.as_path().as_os_str().len(), MAX_PATH_LEN);
        assert!(synthesized.as_path().starts_with("/bin"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Two-byte characters after "/x" put byte 255 inside a character.
        let name = format!("/x{}", "é".repeat(200));
        let path = resolve_command_path(Path::new("/bin"), &name);
        assert_eq!(path.as_path().as_os_str().len(), MAX_PATH_LEN - 1);
        assert!(path.as_path().to_str().is_some());
    }

    #[test]
    fn factory_accepts_any_name() {
        let factory = Factory::<ExternalCommand>::default();
        assert!(factory.try_create(&env(), "anything", &[]).is_some());
    }

    #[test]
    fn nonexistent_program_reports_exec_failure() {
        let cmd = Box::new(ExternalCommand::new(
            resolve_command_path(Path::new("/bin"), "nonexistent-program-for-rux"),
            "nonexistent-program-for-rux".into(),
            Vec::new(),
        ));
        let mut out = Vec::<u8>::new();
        let code = cmd.execute(&mut out, &mut env()).unwrap();
        assert_eq!(code, NOT_EXECUTED);
        let s = String::from_utf8(out).unwrap();
        assert!(
            s.starts_with("execve failed: /bin/nonexistent-program-for-rux: "),
            "unexpected output: {s}"
        );
    }

    #[test]
    fn directory_is_not_executable() {
        let cmd = ExternalCommand::new(
            resolve_command_path(Path::new("/bin"), "/"),
            "/".into(),
            Vec::new(),
        );
        let err = cmd.launch(&mut Vec::<u8>::new()).unwrap_err();
        assert!(matches!(err, LaunchError::Exec { .. }), "got {err:?}");
    }

    #[test]
    fn runs_program_with_arguments_and_captures_output() {
        if !Path::new("/bin/echo").exists() {
            return;
        }
        let cmd = ExternalCommand::new(
            resolve_command_path(Path::new("/bin"), "echo"),
            "echo".into(),
            vec!["from".into(), "child".into()],
        );
        let mut out = Vec::<u8>::new();
        let status = cmd.launch(&mut out).unwrap();
        assert!(status.success());
        assert_eq!(out, b"from child\n");
    }

    #[test]
    fn child_environment_is_empty() {
        if !Path::new("/usr/bin/env").exists() {
            return;
        }
        let cmd = ExternalCommand::new(
            resolve_command_path(Path::new("/bin"), "/usr/bin/env"),
            "env".into(),
            Vec::new(),
        );
        let mut out = Vec::<u8>::new();
        assert!(cmd.launch(&mut out).unwrap().success());
        assert!(out.is_empty(), "child saw {:?}", String::from_utf8_lossy(&out));
    }

    #[test]
    fn child_exit_status_is_reported() {
        if !Path::new("/bin/false").exists() {
            return;
        }
        let cmd = Box::new(ExternalCommand::new(
            resolve_command_path(Path::new("/bin"), "false"),
            "false".into(),
            Vec::new(),
        ));
        let code = cmd.execute(&mut Vec::<u8>::new(), &mut env()).unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn dot_named_program_runs_from_current_dir() {
        use std::os::unix::fs::PermissionsExt;

        if !Path::new("/bin/sh").exists() {
            return;
        }
        let name = format!(".rux_dot_prog_{}", std::process::id());
        std::fs::write(&name, "#!/bin/sh\necho ran-from-cwd\n").unwrap();
        std::fs::set_permissions(&name, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cmd = ExternalCommand::new(
            resolve_command_path(Path::new("/bin"), &name),
            name.as_str().into(),
            Vec::new(),
        );
        let mut out = Vec::<u8>::new();
        let mut result = cmd.launch(&mut out);
        // Another test thread forking while the script was open for writing
        // leaves it briefly busy.
        for _ in 0..10 {
            match &result {
                Err(LaunchError::Spawn(e)) if e.raw_os_error() == Some(libc::ETXTBSY) => {
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    result = cmd.launch(&mut out);
                }
                _ => break,
            }
        }
        std::fs::remove_file(&name).unwrap();

        assert!(result.unwrap().success());
        assert_eq!(out, b"ran-from-cwd\n");
    }
}
