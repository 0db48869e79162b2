//! Builtin registry.
//!
//! Builtins are known at compile time. Each one is an [`argh`] struct
//! implementing [`BuiltinCommand`]; [`Builtin`] is the closed set of names the
//! dispatcher can resolve.

mod fs;
mod net;
mod process;

pub use fs::{Cat, Cd, Echo, Ls, Wc};
pub use net::{CloseServer, SendMessage, StartClient, StartServer};
pub use process::{Kill, Ps};

use crate::command::{EXIT_SUCCESS, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::io::{Read, Write};

/// A builtin command parsed from its arguments.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Runs the command.
    ///
    /// `stdin` is `Some` only when the builtin reads from a pipe. Returns the
    /// exit status, 0 for success.
    fn execute(
        self,
        stdin: Option<&mut dyn Read>,
        stdout: &mut (dyn Write + Send),
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Echo,
    Ls,
    Cd,
    Cat,
    Wc,
    Kill,
    Ps,
    StartServer,
    CloseServer,
    Send,
    StartClient,
}

impl Builtin {
    pub const ALL: [Builtin; 11] = [
        Builtin::Echo,
        Builtin::Ls,
        Builtin::Cd,
        Builtin::Cat,
        Builtin::Wc,
        Builtin::Kill,
        Builtin::Ps,
        Builtin::StartServer,
        Builtin::CloseServer,
        Builtin::Send,
        Builtin::StartClient,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Echo => "echo",
            Builtin::Ls => "ls",
            Builtin::Cd => "cd",
            Builtin::Cat => "cat",
            Builtin::Wc => "wc",
            Builtin::Kill => "kill",
            Builtin::Ps => "ps",
            Builtin::StartServer => "start-server",
            Builtin::CloseServer => "close-server",
            Builtin::Send => "send",
            Builtin::StartClient => "start-client",
        }
    }

    /// Looks up a builtin by command name. `None` means "try an external program".
    pub fn resolve(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    /// Parses `args` for this builtin and runs it.
    pub fn run(
        self,
        args: &[&str],
        stdin: Option<&mut dyn Read>,
        stdout: &mut (dyn Write + Send),
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let name = self.name();
        match self {
            Builtin::Echo => invoke::<Echo>(name, args, stdin, stdout, env),
            Builtin::Ls => invoke::<Ls>(name, args, stdin, stdout, env),
            Builtin::Cd => invoke::<Cd>(name, args, stdin, stdout, env),
            Builtin::Cat => invoke::<Cat>(name, args, stdin, stdout, env),
            Builtin::Wc => invoke::<Wc>(name, args, stdin, stdout, env),
            Builtin::Kill => invoke::<Kill>(name, args, stdin, stdout, env),
            Builtin::Ps => invoke::<Ps>(name, args, stdin, stdout, env),
            Builtin::StartServer => invoke::<StartServer>(name, args, stdin, stdout, env),
            Builtin::CloseServer => invoke::<CloseServer>(name, args, stdin, stdout, env),
            Builtin::Send => invoke::<SendMessage>(name, args, stdin, stdout, env),
            Builtin::StartClient => invoke::<StartClient>(name, args, stdin, stdout, env),
        }
    }
}

/// `--help` output is printed and counts as success; any other early exit is
/// a usage error.
fn invoke<T: BuiltinCommand>(
    name: &str,
    args: &[&str],
    stdin: Option<&mut dyn Read>,
    stdout: &mut (dyn Write + Send),
    env: &mut Environment,
) -> Result<ExitCode> {
    match T::from_args(&[name], args) {
        Ok(cmd) => cmd.execute(stdin, stdout, env),
        Err(EarlyExit {
            output,
            status: Ok(()),
        }) => {
            stdout.write_all(output.as_bytes())?;
            Ok(EXIT_SUCCESS)
        }
        Err(EarlyExit {
            output,
            status: Err(()),
        }) => Err(ShellError::usage(one_line(&output), name).into()),
    }
}

/// argh reports missing arguments as an indented list; diagnostics are one line.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
