//! `mysh`: a small interactive shell.
//!
//! The crate is built around a command execution engine:
//! - a registry of builtin commands ([`Builtin`]),
//! - a two-stage pipeline executor ([`run_pipeline`]),
//! - a background job table kept consistent with an asynchronous SIGCHLD
//!   handler ([`jobs`], [`signals`]),
//! - and the dispatcher that classifies each input line and routes it
//!   ([`Interpreter`]).
//!
//! Around it sit the tokenizer, the variable store and a toy TCP chat
//! service that the `start-server`, `send` and `start-client` builtins drive.

mod builtin;
pub mod chat;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod external;
mod interpreter;
pub mod jobs;
pub mod lexer;
pub mod parser;
mod pipeline;
pub mod signals;

pub use builtin::Builtin;
pub use command::Command;
pub use config::ShellConfig;
pub use env::Environment;
pub use error::ShellError;
pub use interpreter::{Interpreter, OutputSink};
pub use jobs::{JOBS, JobNumber, spawn_background};
pub use pipeline::run_pipeline;
