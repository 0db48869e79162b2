//! A line-oriented TCP chat room: the server run by `start-server` and the
//! one-shot and interactive clients behind `send` and `start-client`.

use crate::error::ShellError;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{self, BufRead, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::process::{Child, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

const BUFFER_SIZE: usize = 1024;
const COUNT_REQUEST: &str = "\\connected";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type ClientList = Arc<Mutex<Vec<(u32, TcpStream)>>>;

fn lock_clients(clients: &ClientList) -> MutexGuard<'_, Vec<(u32, TcpStream)>> {
    clients.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Broadcast chat server. One thread per connected client.
pub struct ChatServer {
    listener: TcpListener,
    clients: ClientList,
    next_id: u32,
}

impl ChatServer {
    pub fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        Ok(Self {
            listener,
            clients: Arc::new(Mutex::new(Vec::new())),
            next_id: 1,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts clients until the listener fails.
    pub fn serve(mut self) -> io::Result<()> {
        tracing::info!(addr = %self.listener.local_addr()?, "chat server listening");
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                    continue;
                }
            };
            let id = self.next_id;
            self.next_id += 1;
            if let Err(err) = self.admit(id, stream) {
                tracing::warn!(id, %err, "could not register client");
            }
        }
        Ok(())
    }

    fn admit(&self, id: u32, mut stream: TcpStream) -> io::Result<()> {
        let peer = stream.peer_addr()?;
        println!("New connection from {peer}, assigned client{id}:");
        lock_clients(&self.clients).push((id, stream.try_clone()?));
        stream.write_all(format!("You are client{id}:\n").as_bytes())?;

        let clients = Arc::clone(&self.clients);
        thread::Builder::new()
            .name(format!("client{id}"))
            .spawn(move || relay(id, stream, clients))?;
        Ok(())
    }
}

/// Reads chunks from one client until it disconnects.
fn relay(id: u32, mut stream: TcpStream, clients: ClientList) {
    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(id, %err, "recv failed");
                break;
            }
        };
        let message = String::from_utf8_lossy(&buf[..n]);
        if message.starts_with(COUNT_REQUEST) {
            let count = lock_clients(&clients).len();
            let _ = stream.write_all(format!("Number of connected clients: {count}\n").as_bytes());
            continue;
        }

        let composed = format!("client{id}: {message}");
        print!("{composed}");
        let _ = io::stdout().flush();
        for (peer, socket) in lock_clients(&clients).iter_mut() {
            if let Err(err) = socket.write_all(composed.as_bytes()) {
                tracing::warn!(peer = *peer, %err, "broadcast failed");
            }
        }
    }

    println!("Client{id}: disconnected");
    lock_clients(&clients).retain(|(client, _)| *client != id);
}

pub fn parse_port(raw: &str) -> Result<u16, ShellError> {
    match raw.parse::<u16>() {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(ShellError::usage("Invalid port", raw)),
    }
}

pub fn resolve_host(host: &str, port: u16) -> Result<Vec<SocketAddr>, ShellError> {
    (host, port)
        .to_socket_addrs()
        .map(|addrs| addrs.collect())
        .map_err(|_| ShellError::usage("Invalid host", host))
}

fn connect(host: &str, port: u16) -> Result<TcpStream, ShellError> {
    let addrs = resolve_host(host, port)?;
    TcpStream::connect(&addrs[..]).map_err(|_| ShellError::Connect(format!("{host}:{port}")))
}

/// Connects, sends `message` followed by a newline and closes.
///
/// Whatever the server sends back is drained until it closes its side, so the
/// connection ends with a FIN rather than a reset.
pub fn send(host: &str, port: u16, message: &str) -> Result<(), ShellError> {
    let mut stream = connect(host, port)?;
    stream.write_all(format!("{message}\n").as_bytes())?;
    stream.shutdown(Shutdown::Write)?;
    stream.set_read_timeout(Some(DRAIN_TIMEOUT))?;
    let _ = io::copy(&mut stream, &mut io::sink());
    Ok(())
}

/// Interactive session: socket data goes to `output` while lines from `input`
/// go to the server. Returns once `input` reaches EOF.
pub fn run_client(
    host: &str,
    port: u16,
    input: &mut dyn BufRead,
    output: &mut (dyn Write + Send),
) -> Result<(), ShellError> {
    let stream = connect(host, port)?;
    let mut incoming = stream.try_clone()?;
    let mut outgoing = stream;

    thread::scope(|scope| {
        let reader = thread::Builder::new()
            .name("chat-reader".into())
            .spawn_scoped(scope, move || {
                let mut buf = [0u8; BUFFER_SIZE];
                loop {
                    match incoming.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if output.write_all(&buf[..n]).and_then(|()| output.flush()).is_err() {
                                break;
                            }
                        }
                    }
                }
            })
            .map_err(|e| ShellError::resource("spawn chat reader", e))?;

        let mut line = String::new();
        let forwarded = loop {
            line.clear();
            match input.read_line(&mut line) {
                Ok(0) => break Ok(()),
                Ok(_) => {
                    if let Err(err) = outgoing.write_all(line.as_bytes()) {
                        break Err(err);
                    }
                }
                Err(err) => break Err(err),
            }
        };

        // after a clean EOF the reader keeps going until the server hangs up
        let how = if forwarded.is_ok() {
            Shutdown::Write
        } else {
            Shutdown::Both
        };
        let _ = outgoing.shutdown(how);
        let _ = reader.join();
        forwarded.map_err(ShellError::from)
    })
}

static SERVER: Mutex<Option<Child>> = Mutex::new(None);

fn server_slot() -> MutexGuard<'static, Option<Child>> {
    SERVER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Starts `mysh --serve <port>` as a child process and returns its pid.
pub fn start_server(port: u16) -> Result<u32, ShellError> {
    let mut slot = server_slot();
    if let Some(child) = slot.as_mut() {
        if let Ok(None) = child.try_wait() {
            return Err(ShellError::usage(
                "Server already running with PID",
                child.id().to_string(),
            ));
        }
    }
    *slot = None;

    let exe = std::env::current_exe()?;
    let child = std::process::Command::new(exe)
        .arg("--serve")
        .arg(port.to_string())
        .stdin(Stdio::null())
        .spawn()?;
    let pid = child.id();
    tracing::info!(port, pid, "chat server started");
    *slot = Some(child);
    Ok(pid)
}

/// Terminates the server started by [`start_server`] and waits for it.
pub fn close_server() -> Result<u32, ShellError> {
    let mut child = server_slot().take().ok_or(ShellError::NoServer)?;
    let pid = child.id();
    // an already-exited server is still a zombie here, so this cannot hit a reused pid
    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    child.wait()?;
    tracing::info!(pid, "chat server stopped");
    Ok(pid)
}
