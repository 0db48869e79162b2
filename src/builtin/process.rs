use super::BuiltinCommand;
use crate::command::{EXIT_SUCCESS, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::jobs::JOBS;
use anyhow::{Context, Result};
use argh::FromArgs;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{Read, Write};

#[derive(FromArgs)]
/// Send a signal to a process.
pub struct Kill {
    #[argh(positional)]
    /// id of the process to signal.
    pub pid: String,

    #[argh(positional)]
    /// signal number; defaults to SIGTERM.
    pub signal: Option<String>,
}

impl Kill {
    fn target(&self) -> Result<Pid, ShellError> {
        match self.pid.parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Pid::from_raw(pid)),
            _ => Err(ShellError::usage("Invalid pid", &self.pid)),
        }
    }

    fn signal(&self) -> Result<Signal, ShellError> {
        let Some(raw) = self.signal.as_deref() else {
            return Ok(Signal::SIGTERM);
        };
        raw.parse::<i32>()
            .ok()
            .and_then(|number| Signal::try_from(number).ok())
            .ok_or_else(|| ShellError::usage("Invalid signal", raw))
    }
}

impl BuiltinCommand for Kill {
    fn execute(
        self,
        _stdin: Option<&mut dyn Read>,
        _stdout: &mut (dyn Write + Send),
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let pid = self.target()?;
        let sig = self.signal()?;
        match signal::kill(pid, sig) {
            Ok(()) => {
                tracing::debug!(%pid, signal = %sig, "signal delivered");
                Ok(EXIT_SUCCESS)
            }
            Err(Errno::ESRCH) => Err(ShellError::NoSuchProcess(self.pid).into()),
            Err(Errno::EPERM) => Err(ShellError::PermissionDenied(self.pid).into()),
            Err(errno) => Err(std::io::Error::from(errno)).with_context(|| format!("kill {pid}")),
        }
    }
}

#[derive(FromArgs)]
/// List running background jobs.
pub struct Ps {}

impl BuiltinCommand for Ps {
    fn execute(
        self,
        _stdin: Option<&mut dyn Read>,
        stdout: &mut (dyn Write + Send),
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let jobs = JOBS.snapshot()?;
        if jobs.is_empty() {
            writeln!(stdout, "No background processes.")?;
        }
        for job in &jobs {
            writeln!(stdout, "{} {}", job.command, job.pid)?;
        }
        Ok(EXIT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::jobs::{self, eventually, job_test_lock};
    use std::process;

    fn kill(pid: &str, signal: Option<&str>) -> Result<ExitCode> {
        let cmd = Kill {
            pid: pid.to_string(),
            signal: signal.map(str::to_string),
        };
        cmd.execute(None, &mut Vec::new(), &mut Environment::with_dir("/"))
    }

    fn ps() -> String {
        let mut out = Vec::new();
        Ps {}
            .execute(None, &mut out, &mut Environment::with_dir("/"))
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_kill_validates_pid_and_signal() {
        for (pid, signal, message) in [
            ("abc", None, "Invalid pid: abc"),
            ("0", None, "Invalid pid: 0"),
            ("-5", None, "Invalid pid: -5"),
            ("1", Some("999"), "Invalid signal: 999"),
            ("1", Some("TERM"), "Invalid signal: TERM"),
        ] {
            let err = kill(pid, signal).unwrap_err();
            assert_eq!(err.to_string(), message);
        }
    }

    #[test]
    fn test_kill_reports_missing_process() {
        // reap a child so its pid is known to be gone
        let mut child = process::Command::new("true").spawn().unwrap();
        let pid = child.id().to_string();
        child.wait().unwrap();

        let err = kill(&pid, None).unwrap_err();
        assert_eq!(err.to_string(), format!("No such process: {pid}"));
    }

    #[test]
    fn test_kill_terminates_child_with_requested_signal() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().to_string();
        kill(&pid, Some("9")).unwrap();
        assert_eq!(child.wait().unwrap().signal(), Some(9));

        let mut child = process::Command::new("sleep").arg("30").spawn().unwrap();
        kill(&child.id().to_string(), None).unwrap();
        assert_eq!(child.wait().unwrap().signal(), Some(15));
    }

    #[test]
    fn test_ps_lists_background_jobs_in_order() {
        let _lock = job_test_lock();
        assert!(eventually(|| JOBS.snapshot().unwrap().is_empty()));
        assert_eq!(ps(), "No background processes.\n");

        let env = Environment::new();
        let mut acks = Vec::new();
        let first: Command = ["sleep", "5"].into_iter().collect();
        let second: Command = ["sleep", "6"].into_iter().collect();
        jobs::spawn_background(&first, &env, &mut acks).unwrap();
        jobs::spawn_background(&second, &env, &mut acks).unwrap();

        let snapshot = JOBS.snapshot().unwrap();
        let listing = ps();
        let expected: String = snapshot
            .iter()
            .map(|job| format!("{} {}\n", job.command, job.pid))
            .collect();
        assert_eq!(listing, expected);
        let lines: Vec<&str> = listing.lines().collect();
        assert!(lines[0].starts_with("sleep 5 "));
        assert!(lines[1].starts_with("sleep 6 "));

        for job in &snapshot {
            kill(&job.pid.to_string(), None).unwrap();
        }
        assert!(eventually(|| JOBS.snapshot().unwrap().is_empty()));
    }
}
