//! Asynchronous notification plumbing: SIGCHLD / SIGINT handlers and the
//! SIGCHLD mask guard that makes job-table updates atomic with respect to them.

use crate::error::ShellError;
use nix::libc;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use std::os::fd::BorrowedFd;
use std::sync::OnceLock;

/// RAII guard that keeps SIGCHLD blocked on the current thread.
///
/// Dropping the guard restores the mask that was active before it was
/// created, so guards nest.
#[must_use = "SIGCHLD is unblocked again as soon as the guard is dropped"]
pub struct ChildSignalMask {
    previous: SigSet,
}

impl ChildSignalMask {
    pub fn block() -> Result<Self, ShellError> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        let mut previous = SigSet::empty();
        signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous))
            .map_err(|e| ShellError::resource("sigprocmask", e))?;
        Ok(Self { previous })
    }
}

impl Drop for ChildSignalMask {
    fn drop(&mut self) {
        let _ = signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

/// Installs the SIGCHLD and SIGINT handlers once per process.
///
/// Later calls return the outcome of the first installation.
pub fn install() -> Result<(), ShellError> {
    static INSTALLED: OnceLock<Result<(), nix::errno::Errno>> = OnceLock::new();
    let outcome = INSTALLED.get_or_init(|| {
        let on_child = SigAction::new(
            SigHandler::Handler(handle_sigchld),
            SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
            SigSet::empty(),
        );
        let on_interrupt = SigAction::new(
            SigHandler::Handler(handle_sigint),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: both handlers only call async-signal-safe functions
        // (waitpid, write) and never allocate.
        unsafe {
            signal::sigaction(Signal::SIGCHLD, &on_child)?;
            signal::sigaction(Signal::SIGINT, &on_interrupt)?;
        }
        tracing::debug!("installed SIGCHLD and SIGINT handlers");
        Ok(())
    });
    (*outcome).map_err(|e| ShellError::resource("sigaction", e))
}

extern "C" fn handle_sigchld(_signal: libc::c_int) {
    crate::jobs::reap_finished();
}

extern "C" fn handle_sigint(_signal: libc::c_int) {
    write_raw(b"\n");
}

/// Writes straight to fd 1 with `write(2)`, bypassing std's buffered stdout.
pub(crate) fn write_raw(bytes: &[u8]) {
    // SAFETY: fd 1 stays open for the lifetime of the process.
    let stdout = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };
    let mut remaining = bytes;
    while !remaining.is_empty() {
        match nix::unistd::write(stdout, remaining) {
            Ok(0) => break,
            Ok(n) => remaining = &remaining[n..],
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sigchld_blocked() -> bool {
        let mut current = SigSet::empty();
        signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, None, Some(&mut current)).unwrap();
        current.contains(Signal::SIGCHLD)
    }

    #[test]
    fn test_mask_guard_blocks_and_restores() {
        std::thread::spawn(|| {
            assert!(!sigchld_blocked());
            {
                let _outer = ChildSignalMask::block().unwrap();
                assert!(sigchld_blocked());
                {
                    let _inner = ChildSignalMask::block().unwrap();
                    assert!(sigchld_blocked());
                }
                // inner guard restores the outer's blocked mask, not an empty one
                assert!(sigchld_blocked());
            }
            assert!(!sigchld_blocked());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_install_is_idempotent() {
        install().unwrap();
        install().unwrap();
    }
}
