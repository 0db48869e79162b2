use crate::command::Command;
use crate::env::Environment;
use crate::error::ShellError;
use crate::lexer::{Token, WordPart};

/// The left side of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// The head was a `name=value` word: it runs as a silent no-op and the
    /// assignment is *not* applied.
    Assignment,
    Command(Command),
}

/// Classified form of one input line.
///
/// Classification order (first match wins): `exit`, pipeline, assignment,
/// background, plain command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Nothing but whitespace.
    Empty,
    /// Literal `exit` as the first word.
    Exit,
    /// `name=value`; the value already has its `$name` references expanded.
    Assignment { name: String, value: String },
    /// `head | tail`, split at the first pipe token.
    Pipeline { head: Stage, tail: Command },
    /// Command followed by a trailing `&` (stripped).
    Background(Command),
    /// Builtin or external command run in the foreground.
    Simple(Command),
}

/// Classifies a token stream and expands every `$name` against `env`.
pub fn classify(tokens: &[Token], env: &Environment) -> Result<Line, ShellError> {
    let Some(first) = tokens.first() else {
        return Ok(Line::Empty);
    };

    if matches!(first, Token::Word(parts) if is_exit(parts)) {
        return Ok(Line::Exit);
    }

    if let Some(split) = tokens.iter().position(|t| *t == Token::Pipe) {
        let (head, tail) = (&tokens[..split], &tokens[split + 1..]);
        let head = if head.first().and_then(assignment_split).is_some() {
            Stage::Assignment
        } else {
            Stage::Command(expand_command(head, env))
        };
        return Ok(Line::Pipeline {
            head,
            tail: expand_command(tail, env),
        });
    }

    if let Some((name, rest)) = assignment_split(first) {
        if name.is_empty() {
            return Err(ShellError::usage(
                "Invalid variable name",
                expand_token(first, env),
            ));
        }
        return Ok(Line::Assignment {
            name,
            value: expand_parts(&rest, env),
        });
    }

    if tokens.last() == Some(&Token::Ampersand) {
        return Ok(Line::Background(expand_command(
            &tokens[..tokens.len() - 1],
            env,
        )));
    }

    Ok(Line::Simple(expand_command(tokens, env)))
}

fn is_exit(parts: &[WordPart]) -> bool {
    matches!(parts, [WordPart::Literal(s)] if s == "exit")
}

/// Splits `name=rest` when the `=` appears in the word's leading literal text,
/// i.e. before any substitution.
fn assignment_split(token: &Token) -> Option<(String, Vec<WordPart>)> {
    let Token::Word(parts) = token else {
        return None;
    };

    let mut name = String::new();
    for (index, part) in parts.iter().enumerate() {
        let WordPart::Literal(text) = part else {
            return None;
        };
        if let Some(eq) = text.find('=') {
            name.push_str(&text[..eq]);
            let mut rest = Vec::with_capacity(parts.len() - index);
            if eq + 1 < text.len() {
                rest.push(WordPart::Literal(text[eq + 1..].to_string()));
            }
            rest.extend(parts[index + 1..].iter().cloned());
            return Some((name, rest));
        }
        name.push_str(text);
    }
    None
}

fn expand_command(tokens: &[Token], env: &Environment) -> Command {
    Command::new(tokens.iter().map(|t| expand_token(t, env)).collect())
}

/// Operator tokens that survive classification become plain arguments.
fn expand_token(token: &Token, env: &Environment) -> String {
    match token {
        Token::Word(parts) => expand_parts(parts, env),
        Token::Pipe => "|".to_string(),
        Token::Ampersand => "&".to_string(),
    }
}

fn expand_parts(parts: &[WordPart], env: &Environment) -> String {
    let mut result = String::new();
    for part in parts {
        match part {
            WordPart::Literal(text) => result.push_str(text),
            WordPart::Param(name) => result.push_str(&env.expand_var(name)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::split_into_tokens;

    fn parse(line: &str, env: &Environment) -> Line {
        classify(&split_into_tokens(line).unwrap(), env).unwrap()
    }

    fn cmd(argv: &[&str]) -> Command {
        argv.iter().copied().collect()
    }

    #[test]
    fn test_empty_and_exit() {
        let env = Environment::with_dir("/");
        assert_eq!(parse("", &env), Line::Empty);
        assert_eq!(parse("exit", &env), Line::Exit);
        assert_eq!(parse("exit now", &env), Line::Exit);
        assert_eq!(parse("echo exit", &env), Line::Simple(cmd(&["echo", "exit"])));
    }

    #[test]
    fn test_pipeline_splits_at_first_pipe_only() {
        let env = Environment::with_dir("/");
        assert_eq!(
            parse("ls --rec | wc | cat", &env),
            Line::Pipeline {
                head: Stage::Command(cmd(&["ls", "--rec"])),
                tail: cmd(&["wc", "|", "cat"]),
            }
        );
    }

    #[test]
    fn test_pipeline_with_empty_side_keeps_empty_command() {
        let env = Environment::with_dir("/");
        assert_eq!(
            parse("echo hi |", &env),
            Line::Pipeline {
                head: Stage::Command(cmd(&["echo", "hi"])),
                tail: Command::default(),
            }
        );
    }

    #[test]
    fn test_assignment_head_in_pipeline_is_a_noop_stage() {
        let mut env = Environment::with_dir("/");
        env.set_var("v", "1");
        assert_eq!(
            parse("x=$v | cat", &env),
            Line::Pipeline {
                head: Stage::Assignment,
                tail: cmd(&["cat"]),
            }
        );
    }

    #[test]
    fn test_assignment_expands_value_once() {
        let mut env = Environment::with_dir("/");
        env.set_var("y", "$z");
        assert_eq!(
            parse("x=$y", &env),
            Line::Assignment {
                name: "x".to_string(),
                value: "$z".to_string(),
            }
        );
        assert_eq!(
            parse("x=$mysh_unset_variable_for_test", &env),
            Line::Assignment {
                name: "x".to_string(),
                value: String::new(),
            }
        );
        assert_eq!(
            parse("msg='a b'=c ignored", &env),
            Line::Assignment {
                name: "msg".to_string(),
                value: "a b=c".to_string(),
            }
        );
    }

    #[test]
    fn test_assignment_without_name_is_rejected() {
        let env = Environment::with_dir("/");
        let tokens = split_into_tokens("=oops").unwrap();
        let err = classify(&tokens, &env).unwrap_err();
        assert_eq!(err.to_string(), "Invalid variable name: =oops");
    }

    #[test]
    fn test_substituted_equals_sign_is_not_an_assignment() {
        let mut env = Environment::with_dir("/");
        env.set_var("kv", "a=b");
        assert_eq!(parse("$kv", &env), Line::Simple(cmd(&["a=b"])));
    }

    #[test]
    fn test_background_strips_trailing_ampersand() {
        let env = Environment::with_dir("/");
        assert_eq!(
            parse("sleep 5 &", &env),
            Line::Background(cmd(&["sleep", "5"]))
        );
        assert_eq!(
            parse("echo a & b", &env),
            Line::Simple(cmd(&["echo", "a", "&", "b"]))
        );
    }

    #[test]
    fn test_arguments_are_expanded() {
        let mut env = Environment::with_dir("/");
        env.set_var("who", "world");
        assert_eq!(
            parse("echo hello $who", &env),
            Line::Simple(cmd(&["echo", "hello", "world"]))
        );
    }
}
