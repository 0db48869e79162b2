use crate::command::{Command, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

/// Resolves `name` to an executable path, searching `PATH` from `env`.
pub fn resolve(name: &str, env: &Environment) -> Option<PathBuf> {
    let search_paths = env.get_var("PATH").unwrap_or_default();
    find_command_path(OsStr::new(&search_paths), Path::new(name), &env.current_dir)
}

/// Builds a ready-to-spawn process for `command`.
///
/// The child runs in `env.current_dir` and sees the shell variables as
/// environment variables. Stdio is left to the caller.
pub fn command_for(command: &Command, env: &Environment) -> Result<process::Command, ShellError> {
    let program = resolve(command.name(), env)
        .ok_or_else(|| ShellError::UnknownCommand(command.name().to_string()))?;
    let mut process = process::Command::new(program);
    process
        .args(command.args())
        .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&env.current_dir);
    Ok(process)
}

/// Runs an external program in the foreground and blocks until it exits.
///
/// Only a zero exit status counts as success. A program that cannot be
/// started, exits nonzero or dies from a signal is reported the same way, as
/// an unknown command.
pub fn run_foreground(command: &Command, env: &Environment) -> Result<(), ShellError> {
    let unknown = || ShellError::UnknownCommand(command.name().to_string());
    let mut child = command_for(command, env)?.spawn().map_err(|_| unknown())?;
    let status = child.wait().map_err(|_| unknown())?;
    let code = exit_code(status);
    tracing::debug!(command = command.name(), code, "foreground program finished");
    if code == 0 { Ok(()) } else { Err(unknown()) }
}

/// Shell-style status: the exit code, or `128 + signal` for a killed child.
pub fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    }
}

fn terminated_by_signal(status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
        128 + signal
    } else if status.core_dumped() {
        255
    } else {
        -1
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names a file.
/// - Relative path with a separator (`bin/tool`, `./tool`): resolved against `cwd`.
/// - Single component: searches each directory in `search_paths` (PATH) and
///   returns the first match.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, path: &Path, cwd: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return find_by_path(path.to_path_buf());
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(single), None) if !path.starts_with(".") => {
            find_in_path(search_paths, single.as_os_str())
        }
        _ => find_by_path(cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths).find_map(|dir| find_by_path(dir.join(cmd)))
}

fn find_by_path(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() { Some(path) } else { None }
}
