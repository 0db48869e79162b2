use super::BuiltinCommand;
use crate::command::{EXIT_SUCCESS, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Write the arguments to standard output, separated by spaces.
///
/// Every argument is printed as-is, including ones that look like flags, so
/// this implements [`FromArgs`] by hand instead of deriving it.
pub struct Echo {
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Echo {
            args: args.iter().map(|arg| arg.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn execute(
        self,
        _stdin: Option<&mut dyn Read>,
        stdout: &mut (dyn Write + Send),
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.args.join(" "))?;
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by HOME.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; `...` and `....` climb two and three levels.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn execute(
        self,
        _stdin: Option<&mut dyn Read>,
        _stdout: &mut (dyn Write + Send),
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match self.target.as_deref() {
            None | Some("") => env.get_var("HOME").ok_or(ShellError::HomeNotSet)?,
            Some("...") => "../..".to_string(),
            Some("....") => "../../..".to_string(),
            Some(other) => other.to_string(),
        };

        let canonical = fs::canonicalize(env.resolve(&target))
            .ok()
            .filter(|dir| dir.is_dir())
            .ok_or_else(|| ShellError::InvalidPath(target.clone()))?;
        tracing::debug!(from = %env.current_dir.display(), to = %canonical.display(), "cd");
        env.current_dir = canonical;
        Ok(EXIT_SUCCESS)
    }
}

/// Picks the input stream for `cat` and `wc`: the named file, else piped stdin.
fn open_input<'a>(
    file: Option<&str>,
    stdin: Option<&'a mut dyn Read>,
    env: &Environment,
) -> Result<Box<dyn Read + 'a>, ShellError> {
    match (file, stdin) {
        (Some(file), _) => {
            let f = fs::File::open(env.resolve(file))
                .map_err(|_| ShellError::CannotOpen(file.to_string()))?;
            Ok(Box::new(BufReader::new(f)))
        }
        (None, Some(stdin)) => Ok(Box::new(stdin)),
        (None, None) => Err(ShellError::NoInput),
    }
}

#[derive(FromArgs)]
/// Print a file, or piped input, to standard output.
pub struct Cat {
    #[argh(positional)]
    /// file to print; reads piped input when omitted.
    pub file: Option<String>,
}

impl BuiltinCommand for Cat {
    fn execute(
        self,
        stdin: Option<&mut dyn Read>,
        stdout: &mut (dyn Write + Send),
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let mut input = open_input(self.file.as_deref(), stdin, env)?;
        std::io::copy(&mut input, stdout)?;
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Count words, characters and newlines.
pub struct Wc {
    #[argh(positional)]
    /// file to count; reads piped input when omitted.
    pub file: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Counts {
    words: u64,
    chars: u64,
    newlines: u64,
}

fn count(input: &mut dyn Read) -> std::io::Result<Counts> {
    let mut counts = Counts::default();
    let mut in_word = false;
    let mut buf = [0u8; 8192];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            return Ok(counts);
        }
        for &byte in &buf[..n] {
            counts.chars += 1;
            if byte == b'\n' {
                counts.newlines += 1;
            }
            if matches!(byte, b' ' | b'\n' | b'\t' | b'\r') {
                in_word = false;
            } else if !in_word {
                counts.words += 1;
                in_word = true;
            }
        }
    }
}

impl BuiltinCommand for Wc {
    fn execute(
        self,
        stdin: Option<&mut dyn Read>,
        stdout: &mut (dyn Write + Send),
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let mut input = open_input(self.file.as_deref(), stdin, env)?;
        let counts = count(&mut input)?;
        writeln!(stdout, "word count {}", counts.words)?;
        writeln!(stdout, "character count {}", counts.chars)?;
        writeln!(stdout, "newline count {}", counts.newlines)?;
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// List directory entries, one name per line.
pub struct Ls {
    #[argh(positional)]
    /// directory to list; defaults to the current directory.
    pub path: Option<String>,

    #[argh(option)]
    /// only print names containing this substring.
    pub f: Option<String>,

    #[argh(switch)]
    /// descend into subdirectories.
    pub rec: bool,

    #[argh(option)]
    /// maximum depth when recursing; 1 lists only the top level.
    pub d: Option<String>,
}

impl Ls {
    fn max_depth(&self) -> Result<Option<usize>, ShellError> {
        let Some(raw) = self.d.as_deref() else {
            return Ok(None);
        };
        match raw.parse::<usize>() {
            Ok(depth) if depth >= 1 => Ok(Some(depth)),
            _ => Err(ShellError::usage("Invalid depth value", raw)),
        }
    }

    fn list(
        &self,
        dir: &Path,
        depth: usize,
        max_depth: Option<usize>,
        stdout: &mut dyn Write,
    ) -> std::io::Result<()> {
        let Ok(entries) = fs::read_dir(dir) else {
            // unreadable subdirectories are skipped
            return Ok(());
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .chain([".".to_string(), "..".to_string()])
            .collect();
        names.sort();

        for name in &names {
            if self.f.as_deref().is_none_or(|filter| name.contains(filter)) {
                writeln!(stdout, "{name}")?;
            }
            if !self.rec || name == "." || name == ".." {
                continue;
            }
            // directory names that fail the filter are still searched
            let child = dir.join(name);
            if child.is_dir() && max_depth.is_none_or(|max| depth < max) {
                self.list(&child, depth + 1, max_depth, stdout)?;
            }
        }
        Ok(())
    }
}

impl BuiltinCommand for Ls {
    fn execute(
        self,
        _stdin: Option<&mut dyn Read>,
        stdout: &mut (dyn Write + Send),
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let max_depth = self.max_depth()?;
        let shown = self.path.as_deref().unwrap_or(".");
        let dir = env.resolve(shown);
        if fs::read_dir(&dir).is_err() {
            return Err(ShellError::InvalidPath(shown.to_string()).into());
        }
        self.list(&dir, 1, max_depth, stdout)?;
        Ok(EXIT_SUCCESS)
    }
}
