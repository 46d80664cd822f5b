use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::lexer::{tokenize, LexError, Token};
use crate::tree::{CommandTree, Keyword, Value};

/// Maximum number of leading bare words that form the command type.
const COMMAND_TYPE_TOKENS: usize = 3;

/// Errors that can occur while parsing command lines.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A line could not be tokenized.
    #[error("line {lineno}: {source}")]
    Lex { lineno: usize, source: LexError },
    /// A line does not start with a command verb.
    #[error("line {lineno}: missing command type")]
    MissingCommandType { lineno: usize },
    /// Failed to read input file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// One input line after parsing.
#[derive(Debug)]
pub enum ParsedLine {
    Command(CommandTree),
    /// Blank line or `#` comment.
    Passthrough { lineno: usize, text: String },
    /// Text that could not be parsed into a command.
    Invalid {
        lineno: usize,
        text: String,
        error: ParseError,
    },
}

impl ParsedLine {
    pub fn lineno(&self) -> usize {
        match self {
            ParsedLine::Command(tree) => tree.lineno,
            ParsedLine::Passthrough { lineno, .. } | ParsedLine::Invalid { lineno, .. } => *lineno,
        }
    }
}

/// Parse one command line. Returns `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str, lineno: usize) -> Result<Option<CommandTree>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let tokens = tokenize(trimmed).map_err(|source| ParseError::Lex { lineno, source })?;
    let mut tokens = tokens.into_iter().peekable();

    let mut command_type = Vec::new();
    while command_type.len() < COMMAND_TYPE_TOKENS {
        match tokens.peek() {
            Some(Token::Word(word)) if !is_keyword_token(word) => {
                command_type.push(word.clone());
                tokens.next();
            }
            _ => break,
        }
    }
    if command_type.is_empty() {
        return Err(ParseError::MissingCommandType { lineno });
    }

    let mut tree = CommandTree::with_type(command_type);
    tree.original_line = line.trim_end_matches(['\r', '\n']).to_string();
    tree.lineno = lineno;

    let mut current: Option<Keyword> = None;
    for token in tokens {
        match token {
            Token::Word(word) if is_keyword_token(&word) => {
                if let Some(keyword) = current.take() {
                    tree.keywords.push(keyword);
                }
                current = Some(Keyword {
                    name: word[1..].to_string(),
                    values: Vec::new(),
                });
            }
            token => {
                let value = match token {
                    Token::Word(text) => Value::new(text),
                    Token::Quoted(text) => Value::quoted(text),
                };
                match current.as_mut() {
                    Some(keyword) => keyword.values.push(value),
                    None => tree.positionals.push(value),
                }
            }
        }
    }
    if let Some(keyword) = current {
        tree.keywords.push(keyword);
    }

    Ok(Some(tree))
}

/// Parse a whole configuration text. Line numbers start at 1.
pub fn parse(input: &str) -> Vec<ParsedLine> {
    input
        .lines()
        .enumerate()
        .map(|(idx, line)| {
            let lineno = idx + 1;
            match parse_line(line, lineno) {
                Ok(Some(tree)) => ParsedLine::Command(tree),
                Ok(None) => ParsedLine::Passthrough {
                    lineno,
                    text: line.to_string(),
                },
                Err(error) => ParsedLine::Invalid {
                    lineno,
                    text: line.to_string(),
                    error,
                },
            }
        })
        .collect()
}

/// Read and parse a configuration file.
pub fn parse_file(path: &Path) -> Result<Vec<ParsedLine>, ParseError> {
    let raw = fs::read_to_string(path)?;
    Ok(parse(&raw))
}

/// `-name` starts a keyword; `-1` and a lone `-` are values.
fn is_keyword_token(word: &str) -> bool {
    let mut chars = word.chars();
    chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}
