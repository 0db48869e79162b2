//! Background jobs: the process-wide job table, background spawn and the
//! reaping routine run from the SIGCHLD handler.
//!
//! The table is the only state shared with the asynchronous handler. Every
//! access from ordinary code goes through [`JobTable::lock`], which demands a
//! live [`ChildSignalMask`], so the handler can never interrupt a thread that
//! holds the lock. The handler side needs no mask: it runs to completion before
//! the interrupted code resumes.

use crate::builtin::Builtin;
use crate::command::Command;
use crate::env::Environment;
use crate::error::ShellError;
use crate::external;
use crate::signals::{self, ChildSignalMask};
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::process;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Maximum number of background jobs tracked at once.
pub const MAX_JOBS: usize = 64;
/// Bytes of command text kept per job; longer commands are truncated.
pub const MAX_COMMAND_TEXT: usize = 128;

const NOTICE_LEN: usize = MAX_COMMAND_TEXT + 32;

/// Sequential job number. Numbers start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobNumber(u32);

impl JobNumber {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Command text stored inline, so dropping a job never touches the heap.
#[derive(Clone, Copy)]
pub struct CommandText {
    bytes: [u8; MAX_COMMAND_TEXT],
    len: usize,
}

impl CommandText {
    /// Copies at most [`MAX_COMMAND_TEXT`] bytes, cutting at a char boundary.
    pub fn new(text: &str) -> Self {
        let mut len = text.len().min(MAX_COMMAND_TEXT);
        while !text.is_char_boundary(len) {
            len -= 1;
        }
        let mut bytes = [0; MAX_COMMAND_TEXT];
        bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self { bytes, len }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }
}

impl fmt::Display for CommandText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CommandText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackgroundJob {
    pub number: JobNumber,
    pub pid: Pid,
    pub command: CommandText,
}

/// Ordered, bounded collection of running background jobs.
///
/// Entries keep insertion order; removal shifts later entries down without
/// reallocating.
#[derive(Debug)]
pub struct JobList {
    entries: Vec<BackgroundJob>,
    next_number: u32,
    capacity: usize,
}

impl JobList {
    pub const fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            next_number: 1,
            capacity,
        }
    }

    /// Registers `pid` and returns its job number.
    ///
    /// Fails with [`ShellError::Capacity`] when the list is full. Entries only
    /// leave through [`JobList::remove`] from the reaper, so `pid` must not be
    /// listed already.
    pub fn insert(&mut self, pid: Pid, command: &str) -> Result<JobNumber, ShellError> {
        debug_assert!(self.get(pid).is_none(), "pid {pid} already listed");
        if self.is_full() {
            return Err(ShellError::Capacity(self.capacity));
        }
        if self.entries.capacity() < self.capacity {
            self.entries
                .reserve_exact(self.capacity - self.entries.len());
        }

        let number = JobNumber(self.next_number);
        self.next_number += 1;
        self.entries.push(BackgroundJob {
            number,
            pid,
            command: CommandText::new(command),
        });
        Ok(number)
    }

    pub fn remove(&mut self, pid: Pid) -> Option<BackgroundJob> {
        let index = self.entries.iter().position(|job| job.pid == pid)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, pid: Pid) -> Option<&BackgroundJob> {
        self.entries.iter().find(|job| job.pid == pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackgroundJob> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}

/// A [`JobList`] shared between ordinary code and the SIGCHLD handler.
pub struct JobTable {
    list: Mutex<JobList>,
}

/// The process-wide job table.
pub static JOBS: JobTable = JobTable::new(MAX_JOBS);

impl JobTable {
    pub const fn new(capacity: usize) -> Self {
        Self {
            list: Mutex::new(JobList::new(capacity)),
        }
    }

    /// Locks the table. The guard cannot outlive `mask`.
    pub fn lock<'a>(&'a self, _mask: &'a ChildSignalMask) -> MutexGuard<'a, JobList> {
        self.list.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies the current entries, in table order.
    pub fn snapshot(&self) -> Result<Vec<BackgroundJob>, ShellError> {
        let mask = ChildSignalMask::block()?;
        let jobs = self.lock(&mask);
        Ok(jobs.iter().copied().collect())
    }

    fn lock_in_handler(&self) -> MutexGuard<'_, JobList> {
        self.list.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Starts `command` without waiting for it and registers it in [`JOBS`].
///
/// SIGCHLD stays blocked from before the spawn until the job is registered
/// and its `[n] pid` acknowledgement has been written, so a job that exits
/// immediately is still reported after its acknowledgement. A full table
/// refuses before anything is spawned.
pub fn spawn_background(
    command: &Command,
    env: &Environment,
    stdout: &mut dyn Write,
) -> Result<JobNumber, ShellError> {
    signals::install()?;
    let mut process = background_process(command, env)?;

    let mask = ChildSignalMask::block()?;
    let mut jobs = JOBS.lock(&mask);
    if jobs.is_full() {
        return Err(ShellError::Capacity(MAX_JOBS));
    }

    let child = process.spawn().map_err(|err| spawn_error(command, err))?;
    let pid = Pid::from_raw(child.id() as i32);
    let number = jobs.insert(pid, &command.text())?;
    tracing::debug!(job = number.get(), %pid, command = %command.text(), "registered background job");

    writeln!(stdout, "[{number}] {pid}")?;
    stdout.flush()?;
    Ok(number)
}

/// The program was already resolved, so only a missing or non-executable
/// file counts as an unknown command. Anything else is the system running out
/// of processes or memory.
fn spawn_error(command: &Command, err: io::Error) -> ShellError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            ShellError::UnknownCommand(command.name().to_string())
        }
        _ => ShellError::resource("spawn", err),
    }
}

/// Builtins run in a re-executed copy of the interpreter so they get a pid of
/// their own.
fn background_process(command: &Command, env: &Environment) -> Result<process::Command, ShellError> {
    if Builtin::resolve(command.name()).is_none() {
        return external::command_for(command, env);
    }

    let exe = std::env::current_exe()
        .map_err(|_| ShellError::UnknownCommand(command.name().to_string()))?;
    let mut process = process::Command::new(exe);
    process
        .arg("--builtin")
        .arg("--")
        .args(command.argv())
        .current_dir(&env.current_dir);
    Ok(process)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited,
    Signaled,
}

/// Fixed-size line buffer; formatting into it never allocates.
pub(crate) struct NoticeBuf {
    bytes: [u8; NOTICE_LEN],
    len: usize,
}

impl NoticeBuf {
    fn new() -> Self {
        Self {
            bytes: [0; NOTICE_LEN],
            len: 0,
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl fmt::Write for NoticeBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let take = s.len().min(NOTICE_LEN - self.len);
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() { Err(fmt::Error) } else { Ok(()) }
    }
}

pub(crate) fn completion_notice(job: &BackgroundJob, termination: Termination) -> NoticeBuf {
    let mut buf = NoticeBuf::new();
    let _ = match termination {
        Termination::Signaled => writeln!(buf, "[{}]+  Done: {}", job.number, job.command),
        Termination::Exited => writeln!(buf, "[{}]+  Done", job.number),
    };
    buf
}

/// Reaps every finished background job without blocking.
///
/// Runs inside the SIGCHLD handler: only `waitpid`, `write` and in-place
/// vector shifts happen here. Children that are not in the table are left
/// alone for whoever owns them.
pub(crate) fn reap_finished() {
    let mut jobs = JOBS.lock_in_handler();
    let mut index = 0;
    while index < jobs.entries.len() {
        let job = jobs.entries[index];
        let termination = match waitpid(job.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(..)) => Some(Termination::Exited),
            Ok(WaitStatus::Signaled(..)) => Some(Termination::Signaled),
            Err(Errno::EINTR) => continue,
            // already collected by someone else; nothing left to report
            Err(_) => {
                jobs.entries.remove(index);
                continue;
            }
            Ok(_) => None,
        };

        match termination {
            Some(termination) => {
                signals::write_raw(completion_notice(&job, termination).as_bytes());
                jobs.entries.remove(index);
            }
            None => index += 1,
        }
    }
}

#[cfg(test)]
pub(crate) fn job_test_lock() -> MutexGuard<'static, ()> {
    use std::sync::OnceLock;
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
    }
    false
}
