//! Two-stage pipelines: `head | tail`.
//!
//! Each stage runs on its own scoped thread. A builtin stage executes on that
//! thread against a private copy of the [`Environment`]; an external stage
//! spawns its program with the pipe end as stdin or stdout and waits for it.

use crate::builtin::Builtin;
use crate::command::{Command, EXIT_FAILURE, EXIT_NOT_FOUND, EXIT_SUCCESS, ExitCode, Stdin, Stdout};
use crate::env::Environment;
use crate::error::{ShellError, report_stderr};
use crate::external;
use crate::parser::Stage;
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::fs::File;
use std::io::Write;
use std::thread;

/// Runs `head | tail` and blocks until both stages are done.
///
/// Stage failures are reported on stderr as `ERROR: ...` and otherwise
/// ignored: the exit statuses of the two stages are not surfaced. Only a
/// failure to build the pipe or the stage threads is returned, and it is fatal.
pub fn run_pipeline(
    head: &Stage,
    tail: &Command,
    env: &Environment,
    stdout: Box<dyn Stdout + Send>,
) -> Result<(), ShellError> {
    // close-on-exec so no unrelated child keeps the write end open
    let (read_end, write_end) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| ShellError::resource("pipe", e))?;
    let reader = File::from(read_end);
    let writer = File::from(write_end);

    let (head_status, tail_status) = thread::scope(|scope| {
        let producer = match head {
            Stage::Assignment => {
                drop(writer);
                None
            }
            Stage::Command(command) => {
                let env = env.clone();
                let handle = thread::Builder::new()
                    .name("pipeline-head".into())
                    .spawn_scoped(scope, move || run_stage(command, None, Box::new(writer), env))
                    .map_err(|e| ShellError::resource("spawn pipeline stage", e))?;
                Some(handle)
            }
        };

        let env = env.clone();
        let consumer = thread::Builder::new()
            .name("pipeline-tail".into())
            .spawn_scoped(scope, move || {
                run_stage(tail, Some(Box::new(reader)), stdout, env)
            })
            .map_err(|e| ShellError::resource("spawn pipeline stage", e))?;

        let head_status = match producer {
            Some(handle) => handle.join().unwrap_or(EXIT_FAILURE),
            None => EXIT_SUCCESS,
        };
        let tail_status = consumer.join().unwrap_or(EXIT_FAILURE);
        Ok::<_, ShellError>((head_status, tail_status))
    })?;

    tracing::debug!(head_status, tail_status, "pipeline finished");
    Ok(())
}

/// Runs one side of a pipeline and returns its exit status.
fn run_stage(
    command: &Command,
    stdin: Option<Box<dyn Stdin + Send>>,
    mut stdout: Box<dyn Stdout + Send>,
    mut env: Environment,
) -> ExitCode {
    if let Some(builtin) = Builtin::resolve(command.name()) {
        let args = command.args();
        let result = match stdin {
            Some(mut input) => builtin.run(&args, Some(&mut input), &mut stdout, &mut env),
            None => builtin.run(&args, None, &mut stdout, &mut env),
        };
        let _ = stdout.flush();
        return match result {
            Ok(code) => code,
            Err(err) => {
                report_stderr(&err);
                EXIT_FAILURE
            }
        };
    }

    let mut process = match external::command_for(command, &env) {
        Ok(process) => process,
        Err(err) => {
            report_stderr(&err);
            return EXIT_NOT_FOUND;
        }
    };
    if let Some(input) = stdin {
        process.stdin(input.stdio());
    }
    process.stdout(stdout.stdio());

    // the process builder holds the pipe ends; they must be closed once the
    // child has its copies, or the other stage never sees EOF
    let spawned = process.spawn();
    drop(process);
    match spawned {
        Ok(mut child) => child.wait().map(external::exit_code).unwrap_or(EXIT_FAILURE),
        Err(_) => {
            report_stderr(&ShellError::UnknownCommand(command.name().to_string()));
            EXIT_NOT_FOUND
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Read, Seek, SeekFrom};
    use tempfile::{NamedTempFile, tempdir};

    fn cmd(argv: &[&str]) -> Command {
        argv.iter().copied().collect()
    }

    /// Runs the pipeline with its final output captured in a temp file.
    fn capture(head: Stage, tail: Command, env: &Environment) -> String {
        let mut out = NamedTempFile::new().unwrap();
        let sink = out.reopen().unwrap();
        run_pipeline(&head, &tail, env, Box::new(sink)).unwrap();
        let file = out.as_file_mut();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    /// Independent word/char/newline count over a string.
    fn reference_counts(text: &str) -> String {
        let words = text.split_ascii_whitespace().count();
        let newlines = text.matches('\n').count();
        format!(
            "word count {words}\ncharacter count {}\nnewline count {newlines}\n",
            text.len()
        )
    }

    #[test]
    fn test_two_builtins() {
        let env = Environment::new();
        let out = capture(
            Stage::Command(cmd(&["echo", "hi"])),
            cmd(&["cat"]),
            &env,
        );
        assert_eq!(out, "hi\n");
    }

    #[test]
    fn test_wc_over_fixed_input_matches_reference() {
        let dir = tempdir().unwrap();
        let text: String = (0..100)
            .map(|line| {
                let words: Vec<String> = (0..5).map(|w| format!("w{line}x{w}")).collect();
                format!("{}\n", words.join(" "))
            })
            .collect();
        fs::write(dir.path().join("input.txt"), &text).unwrap();
        let env = Environment::with_dir(dir.path());

        let out = capture(
            Stage::Command(cmd(&["cat", "input.txt"])),
            cmd(&["wc"]),
            &env,
        );
        assert_eq!(out, reference_counts(&text));
        assert!(out.starts_with("word count 500\n"));
        assert!(out.ends_with("newline count 100\n"));
    }

    #[test]
    fn test_external_stages_see_eof() {
        let env = Environment::new();
        let out = capture(
            Stage::Command(cmd(&["printf", "a\\nb\\nc\\n"])),
            cmd(&["tr", "a-z", "A-Z"]),
            &env,
        );
        assert_eq!(out, "A\nB\nC\n");

        let mixed = capture(Stage::Command(cmd(&["echo", "mixed"])), cmd(&["tr", "m", "M"]), &env);
        assert_eq!(mixed, "Mixed\n");
    }

    #[test]
    fn test_assignment_head_produces_no_input() {
        let env = Environment::new();
        let out = capture(Stage::Assignment, cmd(&["wc"]), &env);
        assert_eq!(out, "word count 0\ncharacter count 0\nnewline count 0\n");
    }

    #[test]
    fn test_unknown_stage_does_not_abort_pipeline() {
        let env = Environment::new();
        let out = capture(
            Stage::Command(cmd(&["mysh-missing-producer"])),
            cmd(&["wc"]),
            &env,
        );
        assert_eq!(out, "word count 0\ncharacter count 0\nnewline count 0\n");

        let empty_tail = capture(Stage::Command(cmd(&["echo", "x"])), Command::default(), &env);
        assert_eq!(empty_tail, "");
    }

    #[test]
    fn test_cd_inside_pipeline_does_not_leak() {
        let dir = tempdir().unwrap();
        let env = Environment::with_dir(dir.path());
        capture(Stage::Command(cmd(&["cd", "/"])), cmd(&["cat"]), &env);
        assert_eq!(env.current_dir, dir.path());
    }
}
