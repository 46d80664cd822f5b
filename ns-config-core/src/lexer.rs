use thiserror::Error;

/// A lexical token of one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare word, split on whitespace.
    Word(String),
    /// Single- or double-quoted string, quotes removed and escapes resolved.
    Quoted(String),
}

impl Token {
    pub fn text(&self) -> &str {
        match self {
            Token::Word(text) | Token::Quoted(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated quoted string starting at column {column}")]
    UnterminatedQuote { column: usize },
}

/// Split a command line into words and quoted strings.
///
/// Inside double quotes `\"` and `\\` are escapes; any other backslash is kept
/// literally. Single quotes take their content verbatim.
pub fn tokenize(line: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                if ch == c {
                    closed = true;
                    break;
                }
                if ch == '\\' && c == '"' {
                    match chars.peek() {
                        Some(&(_, next)) if next == '"' || next == '\\' => {
                            text.push(next);
                            chars.next();
                        }
                        _ => text.push(ch),
                    }
                    continue;
                }
                text.push(ch);
            }
            if !closed {
                return Err(LexError::UnterminatedQuote { column: start + 1 });
            }
            tokens.push(Token::Quoted(text));
            continue;
        }

        let mut text = String::new();
        while let Some(&(_, ch)) = chars.peek() {
            if ch.is_whitespace() {
                break;
            }
            text.push(ch);
            chars.next();
        }
        tokens.push(Token::Word(text));
    }

    Ok(tokens)
}
