use crate::config::ShellConfig;

/// Mutable per-session state handed to every command the interpreter runs.
///
/// The environment contains:
/// - `config`: the session's [`ShellConfig`] (search directory, limits, prompt).
/// - `should_exit`: set by `exit`/`quit`; the read-eval loop stops once it is true.
///
/// Note: the process environment is deliberately absent. External programs are
/// launched with an empty environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub config: ShellConfig,
    pub should_exit: bool,
}

impl Environment {
    /// Create a fresh session state for `config`. `should_exit` starts out `false`.
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config,
            should_exit: false,
        }
    }

    /// Ask the read-eval loop to terminate after the current command.
    pub fn request_exit(&mut self) {
        self.should_exit = true;
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ShellConfig;
    use crate::env::Environment;
    use std::path::Path;

    #[test]
    fn test_env_starts_running_with_defaults() {
        let env = Environment::new(ShellConfig::default());
        assert!(!env.should_exit);
        assert_eq!(env.config.search_dir, Path::new("/bin"));
        assert_eq!(env.config.prompt, "rux> ");
    }

    #[test]
    fn test_env_request_exit() {
        let mut env = Environment::default();
        env.request_exit();
        assert!(env.should_exit);
    }
}
