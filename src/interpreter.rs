use crate::builtin::Builtin;
use crate::command::{Command, Stdout};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::error::{ShellError, report_stderr};
use crate::external;
use crate::jobs;
use crate::lexer;
use crate::parser::{self, Line};
use crate::pipeline;
use crate::signals;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs::File;
use std::io::{self, Write};

/// Where command output goes.
#[derive(Debug)]
pub enum OutputSink {
    /// The process stdout.
    Inherit,
    /// A file; every command gets its own handle to it.
    File(File),
}

impl OutputSink {
    fn writer(&self) -> io::Result<Box<dyn Stdout + Send>> {
        match self {
            OutputSink::Inherit => Ok(Box::new(io::stdout())),
            OutputSink::File(file) => Ok(Box::new(file.try_clone()?)),
        }
    }
}

/// The command dispatcher: classifies each input line and routes it to the
/// variable store, the pipeline executor, background spawn, a builtin or an
/// external program.
///
/// Example
/// ```no_run
/// use mysh::{Interpreter, ShellConfig};
/// let mut sh = Interpreter::new(ShellConfig::default());
/// sh.execute_line("greeting=hello").unwrap();
/// sh.execute_line("echo $greeting | wc").unwrap();
/// ```
pub struct Interpreter {
    env: Environment,
    config: ShellConfig,
    sink: OutputSink,
}

impl Interpreter {
    pub fn new(config: ShellConfig) -> Self {
        Self::with_output(config, OutputSink::Inherit)
    }

    pub fn with_output(config: ShellConfig, sink: OutputSink) -> Self {
        Self {
            env: Environment::new(),
            config,
            sink,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Executes one input line.
    ///
    /// Non-fatal errors are reported as `ERROR: ...` on stderr and swallowed.
    /// Only fatal errors, which leave the interpreter unable to continue, are
    /// returned.
    pub fn execute_line(&mut self, line: &str) -> Result<(), ShellError> {
        match self.dispatch(line) {
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                report_stderr(&err);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    fn dispatch(&mut self, line: &str) -> Result<(), ShellError> {
        let tokens =
            lexer::split_into_tokens(line).map_err(|e| ShellError::Syntax(e.to_string()))?;
        let line = parser::classify(&tokens, &self.env)?;
        tracing::debug!(?line, "classified");

        match line {
            Line::Empty => Ok(()),
            Line::Exit => {
                self.env.should_exit = true;
                Ok(())
            }
            Line::Assignment { name, value } => {
                self.env.set_var(name, value);
                Ok(())
            }
            Line::Pipeline { head, tail } => {
                pipeline::run_pipeline(&head, &tail, &self.env, self.sink.writer()?)
            }
            Line::Background(command) => {
                let mut out = self.sink.writer()?;
                jobs::spawn_background(&command, &self.env, &mut out)?;
                Ok(())
            }
            Line::Simple(command) => self.run_foreground(&command),
        }
    }

    fn run_foreground(&mut self, command: &Command) -> Result<(), ShellError> {
        let Some(builtin) = Builtin::resolve(command.name()) else {
            return external::run_foreground(command, &self.env);
        };

        let previous_dir = self.env.current_dir.clone();
        let mut out = self.sink.writer()?;
        let result = builtin.run(&command.args(), None, &mut out, &mut self.env);
        let _ = out.flush();

        if self.env.current_dir != previous_dir {
            std::env::set_current_dir(&self.env.current_dir)?;
        }

        match result {
            Ok(code) => {
                tracing::trace!(builtin = builtin.name(), code, "builtin finished");
                Ok(())
            }
            Err(err) => match err.downcast::<ShellError>() {
                Ok(shell) => Err(shell),
                Err(other) => Err(ShellError::usage(format!("{other:#}"), builtin.name())),
            },
        }
    }

    /// Reads and executes lines until `exit` or end of input.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        signals::install()?;
        let mut editor = DefaultEditor::new()?;

        while !self.env.should_exit {
            match editor.readline(&self.config.prompt) {
                Ok(line) => {
                    if self.config.history && !line.trim().is_empty() {
                        editor.add_history_entry(line.as_str())?;
                    }
                    self.execute_line(&line)?;
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}
