use super::BuiltinCommand;
use crate::chat;
use crate::command::{EXIT_SUCCESS, ExitCode};
use crate::env::Environment;
use anyhow::Result;
use argh::FromArgs;
use std::io::{self, BufRead, BufReader, Read, Write};

#[derive(FromArgs)]
/// Start the chat server in a separate process.
pub struct StartServer {
    #[argh(positional)]
    /// port to listen on (1-65535).
    pub port: String,
}

impl BuiltinCommand for StartServer {
    fn execute(
        self,
        _stdin: Option<&mut dyn Read>,
        stdout: &mut (dyn Write + Send),
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let port = chat::parse_port(&self.port)?;
        let pid = chat::start_server(port)?;
        writeln!(stdout, "Server started on port {port} with PID {pid}")?;
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Stop the chat server started by start-server.
pub struct CloseServer {}

impl BuiltinCommand for CloseServer {
    fn execute(
        self,
        _stdin: Option<&mut dyn Read>,
        _stdout: &mut (dyn Write + Send),
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        chat::close_server()?;
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Send one message to a chat server.
pub struct SendMessage {
    #[argh(positional)]
    /// server port.
    pub port: String,

    #[argh(positional)]
    /// server host name or address.
    pub host: String,

    #[argh(positional, greedy)]
    /// words of the message, joined with spaces.
    pub message: Vec<String>,
}

impl BuiltinCommand for SendMessage {
    fn execute(
        self,
        _stdin: Option<&mut dyn Read>,
        _stdout: &mut (dyn Write + Send),
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let port = chat::parse_port(&self.port)?;
        chat::send(&self.host, port, &self.message.join(" "))?;
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Join a chat server interactively until end of input.
pub struct StartClient {
    #[argh(positional)]
    /// server port.
    pub port: String,

    #[argh(positional)]
    /// server host name or address.
    pub host: String,
}

impl BuiltinCommand for StartClient {
    fn execute(
        self,
        stdin: Option<&mut dyn Read>,
        stdout: &mut (dyn Write + Send),
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let port = chat::parse_port(&self.port)?;
        let mut input: Box<dyn BufRead + '_> = match stdin {
            Some(piped) => Box::new(BufReader::new(piped)),
            None => Box::new(io::stdin().lock()),
        };
        chat::run_client(&self.host, port, &mut input, stdout)?;
        Ok(EXIT_SUCCESS)
    }
}
