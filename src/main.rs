use argh::FromArgs;
use log::error;
use rux_shell::config::{DEFAULT_PROMPT, DEFAULT_SEARCH_DIR};
use rux_shell::{Interpreter, LengthPolicy, ShellConfig};

#[derive(FromArgs)]
/// Interactive command shell for the Rux userspace.
struct Args {
    #[argh(option, default = "String::from(DEFAULT_SEARCH_DIR)")]
    /// directory bare command names are looked up in (default: /bin)
    search_dir: String,

    #[argh(option, default = "String::from(DEFAULT_PROMPT)")]
    /// prompt printed before each line
    prompt: String,

    #[argh(switch)]
    /// do not print the startup banner
    no_banner: bool,

    #[argh(switch)]
    /// cut over-long input lines down instead of rejecting them
    truncate_long_lines: bool,

    #[argh(option, short = 'c')]
    /// run a single command line and exit
    command: Option<String>,
}

fn main() -> std::process::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("RUX_LOG", "warn")).init();

    let args: Args = argh::from_env();
    let config = ShellConfig {
        prompt: args.prompt,
        search_dir: args.search_dir.into(),
        long_lines: if args.truncate_long_lines {
            LengthPolicy::Truncate
        } else {
            LengthPolicy::Reject
        },
        banner: !args.no_banner,
        ..ShellConfig::default()
    };
    let mut sh = Interpreter::with_config(config);

    let code = match args.command {
        Some(line) => {
            if let Err(e) = sh.execute_line(&line, &mut std::io::stdout()) {
                error!("{e:#}");
            }
            0
        }
        None => sh.repl(),
    };
    std::process::ExitCode::from(code as u8)
}
