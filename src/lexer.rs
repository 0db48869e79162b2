//! Lexical analysis (tokenization) of one interactive input line.

use thiserror::Error;

/// A part of a word: either literal text or a parameter substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    /// Literal text that requires no further processing.
    Literal(String),
    /// Parameter substitution written as `$name` or `${name}`. Holds the name.
    Param(String),
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word token, which may be composed of multiple parts (`WordPart`).
    Word(Vec<WordPart>),
    /// The pipe operator, `|`.
    Pipe,
    /// The background operator, `&`.
    Ampersand,
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    #[error("unterminated quote")]
    UnfinishedQuote,
    /// A closing brace for parameter substitution `${...}` was not found.
    #[error("unterminated ${{...}} substitution")]
    UnfinishedParamSubst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    current_word: Vec<WordPart>,
    buffer: String,
    // set once the current word contained a quote, so `''` still yields a word
    quoted: bool,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            current_word: Vec::new(),
            buffer: String::new(),
            quoted: false,
        }
    }

    /// Runs the state machine over the whole input.
    fn make_tokens(&mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote => {
                return Err(LexingError::UnfinishedQuote);
            }
            LexingState::Start | LexingState::ReadingWord => {}
        }

        self.finish_word(&mut out);
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            ' ' | '\t' => Ok(()),
            '|' => {
                out.push(Token::Pipe);
                Ok(())
            }
            '&' => {
                out.push(Token::Ampersand);
                Ok(())
            }
            c => {
                self.state = LexingState::ReadingWord;
                self.handle_word(c, out)
            }
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            ' ' | '\t' => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '|' | '&' => {
                self.finish_word(out);
                out.push(if ch == '|' {
                    Token::Pipe
                } else {
                    Token::Ampersand
                });
                self.state = LexingState::Start;
            }
            '\'' => {
                self.quoted = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.quoted = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            '$' => self.read_param()?,
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '$' => self.read_param()?,
            c => self.buffer.push(c),
        }
        Ok(())
    }

    /// Called right after a `$`. Emits a `Param` part, or keeps the `$` literal
    /// when no name follows.
    fn read_param(&mut self) -> Result<(), LexingError> {
        match self.peek_char() {
            Some('{') => {
                self.read_char();
                let mut name = String::new();
                loop {
                    match self.read_char() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(LexingError::UnfinishedParamSubst),
                    }
                }
                self.flush_literal();
                self.current_word.push(WordPart::Param(name));
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = self.peek_char() {
                    if !(c.is_ascii_alphanumeric() || c == '_') {
                        break;
                    }
                    name.push(c);
                    self.read_char();
                }
                self.flush_literal();
                self.current_word.push(WordPart::Param(name));
            }
            _ => self.buffer.push('$'),
        }
        Ok(())
    }

    fn flush_literal(&mut self) {
        if !self.buffer.is_empty() {
            self.current_word
                .push(WordPart::Literal(std::mem::take(&mut self.buffer)));
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        self.flush_literal();
        if self.current_word.is_empty() && self.quoted {
            self.current_word.push(WordPart::Literal(String::new()));
        }
        if !self.current_word.is_empty() {
            out.push(Token::Word(std::mem::take(&mut self.current_word)));
        }
        self.quoted = false;
    }
}

/// Tokenizes one input line.
///
/// Words are split on spaces and tabs; `|` and `&` are always operator tokens
/// unless quoted.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Token {
        Token::Word(vec![WordPart::Literal(s.to_string())])
    }

    #[test]
    fn test_splits_words_and_operators() {
        let tokens = split_into_tokens("echo hi |cat&").unwrap();
        assert_eq!(
            tokens,
            vec![lit("echo"), lit("hi"), Token::Pipe, lit("cat"), Token::Ampersand]
        );
    }

    #[test]
    fn test_quotes_keep_operators_literal() {
        let tokens = split_into_tokens("echo '|' \"a & b\"").unwrap();
        assert_eq!(tokens, vec![lit("echo"), lit("|"), lit("a & b")]);
    }

    #[test]
    fn test_params_inside_words_and_double_quotes() {
        let tokens = split_into_tokens("x=$y \"pre-${name}\" '$raw'").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word(vec![
                    WordPart::Literal("x=".to_string()),
                    WordPart::Param("y".to_string()),
                ]),
                Token::Word(vec![
                    WordPart::Literal("pre-".to_string()),
                    WordPart::Param("name".to_string()),
                ]),
                lit("$raw"),
            ]
        );
    }

    #[test]
    fn test_lone_dollar_is_literal() {
        let tokens = split_into_tokens("echo $ $1").unwrap();
        assert_eq!(tokens, vec![lit("echo"), lit("$"), lit("$1")]);
    }

    #[test]
    fn test_empty_quotes_make_an_empty_word() {
        let tokens = split_into_tokens("echo ''").unwrap();
        assert_eq!(tokens, vec![lit("echo"), lit("")]);
    }

    #[test]
    fn test_unfinished_constructs_are_errors() {
        assert_eq!(
            split_into_tokens("echo 'oops"),
            Err(LexingError::UnfinishedQuote)
        );
        assert_eq!(
            split_into_tokens("echo ${oops"),
            Err(LexingError::UnfinishedParamSubst)
        );
    }

    #[test]
    fn test_blank_line_has_no_tokens() {
        assert!(split_into_tokens("   \t ").unwrap().is_empty());
    }
}
