use std::env;

pub const DEFAULT_PROMPT: &str = "mysh$ ";
/// Environment variable that overrides [`DEFAULT_PROMPT`].
pub const PROMPT_VAR: &str = "MYSH_PROMPT";

/// Interactive-loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub prompt: String,
    /// Record entered lines in the line editor's history.
    pub history: bool,
}

impl ShellConfig {
    /// Builds the configuration from the process environment and flags.
    ///
    /// Precedence for the prompt: `prompt_flag`, then `$MYSH_PROMPT`, then the
    /// default.
    pub fn from_env(prompt_flag: Option<String>, no_history: bool) -> Self {
        let prompt = prompt_flag
            .or_else(|| env::var(PROMPT_VAR).ok())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());
        Self {
            prompt,
            history: !no_history,
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            history: true,
        }
    }
}
