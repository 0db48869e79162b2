use argh::FromArgs;
use mysh::chat::ChatServer;
use mysh::error::report_stderr;
use mysh::{Builtin, Environment, Interpreter, ShellConfig};
use std::process::ExitCode;

#[derive(FromArgs)]
/// A small interactive shell with pipelines and background jobs.
struct Args {
    /// prompt to display; overrides $MYSH_PROMPT.
    #[argh(option)]
    prompt: Option<String>,

    /// run a single command line and exit.
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// do not keep a line history.
    #[argh(switch)]
    no_history: bool,

    /// run the chat server on this port.
    #[argh(option, hidden_help)]
    serve: Option<u16>,

    /// run one builtin given as trailing arguments and exit with its status.
    #[argh(switch, hidden_help)]
    builtin: bool,

    /// arguments for --builtin.
    #[argh(positional, greedy, hidden_help)]
    argv: Vec<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Args = argh::from_env();

    if let Some(port) = args.serve {
        ChatServer::bind(port)?.serve()?;
        return Ok(ExitCode::SUCCESS);
    }

    if args.builtin {
        return Ok(run_builtin(&args.argv));
    }

    let config = ShellConfig::from_env(args.prompt, args.no_history);
    let mut shell = Interpreter::new(config);
    match args.command {
        Some(line) => {
            mysh::signals::install()?;
            shell.execute_line(&line)?;
        }
        None => shell.repl()?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Entry point of a background builtin: the interpreter re-executes itself
/// with `--builtin -- name args...`.
fn run_builtin(argv: &[String]) -> ExitCode {
    let Some((name, rest)) = argv.split_first() else {
        return ExitCode::FAILURE;
    };
    let Some(builtin) = Builtin::resolve(name) else {
        report_stderr(&mysh::ShellError::UnknownCommand(name.clone()));
        return ExitCode::from(127);
    };

    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    let mut env = Environment::new();
    let mut stdout = std::io::stdout();
    match builtin.run(&rest, None, &mut stdout, &mut env) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            report_stderr(&err);
            ExitCode::FAILURE
        }
    }
}
