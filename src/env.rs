use std::collections::HashMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};

/// Mutable, user-level state of the interpreter.
///
/// The environment contains:
/// - `vars`: the shell variable store filled by `name=value` lines.
/// - `current_dir`: the working directory for command execution.
/// - `should_exit`: a flag the REPL loop checks to know when to terminate.
///
/// Fields are public so builtins can read and update them directly.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Shell variables. Last writer wins.
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, the interactive loop exits after the current line.
    pub should_exit: bool,
}

impl Environment {
    /// Start with an empty variable store rooted at the process working directory.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_dir(current_dir)
    }

    pub fn with_dir(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            current_dir: current_dir.into(),
            should_exit: false,
        }
    }

    /// Get the value of a variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Value used for `$key` expansion; unset variables expand to nothing.
    pub fn expand_var(&self, key: &str) -> String {
        self.get_var(key).unwrap_or_default()
    }

    /// Set or override a variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Resolve `path` against `current_dir` unless it is already absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
