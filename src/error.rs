use std::io::{self, Write};
use thiserror::Error;

/// Coarse classification of a [`ShellError`].
///
/// Only [`ErrorKind::Resource`] is fatal; everything else is reported and the
/// interpreter keeps prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    Syntax,
    Resource,
    NotFound,
    Permission,
    Capacity,
    Io,
}

/// Errors produced while classifying or executing a command line.
///
/// The `Display` form is `<description>: <offending token>`; [`report`] adds
/// the `ERROR: ` prefix.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{message}: {token}")]
    Usage { message: String, token: String },

    #[error("No input source provided")]
    NoInput,

    #[error("HOME not set")]
    HomeNotSet,

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Cannot open file: {0}")]
    CannotOpen(String),

    #[error("No such process: {0}")]
    NoSuchProcess(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Too many background jobs: {0}")]
    Capacity(usize),

    #[error("No server is running")]
    NoServer,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("{context}: {source}")]
    Resource {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShellError {
    pub fn usage(message: impl Into<String>, token: impl Into<String>) -> Self {
        ShellError::Usage {
            message: message.into(),
            token: token.into(),
        }
    }

    /// Wraps an OS failure while building a core primitive (pipe, thread, mask).
    pub fn resource(context: &'static str, source: impl Into<io::Error>) -> Self {
        ShellError::Resource {
            context,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ShellError::Usage { .. }
            | ShellError::NoInput
            | ShellError::HomeNotSet
            | ShellError::NoServer => ErrorKind::Usage,
            ShellError::Syntax(_) => ErrorKind::Syntax,
            ShellError::UnknownCommand(_)
            | ShellError::InvalidPath(_)
            | ShellError::CannotOpen(_)
            | ShellError::NoSuchProcess(_)
            | ShellError::Connect(_) => ErrorKind::NotFound,
            ShellError::PermissionDenied(_) => ErrorKind::Permission,
            ShellError::Capacity(_) => ErrorKind::Capacity,
            ShellError::Resource { .. } => ErrorKind::Resource,
            ShellError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Resource
    }
}

/// Writes a single `ERROR: ...` diagnostic line to `sink`.
///
/// Failures to write the diagnostic itself are ignored; there is nowhere
/// left to report them.
pub fn report(err: &dyn std::fmt::Display, sink: &mut dyn Write) {
    let _ = writeln!(sink, "ERROR: {err}");
    let _ = sink.flush();
}

/// Convenience wrapper around [`report`] for the process stderr.
pub fn report_stderr(err: &dyn std::fmt::Display) {
    report(err, &mut io::stderr().lock());
}
