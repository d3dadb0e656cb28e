//! Lexer for Command Lines
//!
//! The lexer turns a single command line into a flat stream of tokens that
//! the parser consumes. It handles:
//! - Bare words, ended by whitespace or an operator character
//! - Single- and double-quoted words (verbatim, no escapes)
//! - The operators `|`, `&`, `<`, `>` and `;`
//!
//! Tokens only record byte offsets into the input; their text is sliced out
//! on demand with [`Token::text`].

use std::collections::HashMap;
use std::iter::FusedIterator;
use thiserror::Error;

/// Token types for the command-line lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    /// A word or quoted literal
    Atom,
    Pipe,      // |
    Amp,       // &
    Great,     // >
    Less,      // <
    Semicolon, // ;
    /// End of input
    Eol,
    /// Lexing stopped; the token marks the offending offset
    Error,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Atom => "ATOM",
            Self::Pipe => "|",
            Self::Amp => "&",
            Self::Great => ">",
            Self::Less => "<",
            Self::Semicolon => ";",
            Self::Eol => "EOL",
            Self::Error => "ERROR",
        }
    }
}

/// A token produced by the lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    /// Byte range into the original input
    pub start: usize,
    pub end: usize,
    /// Diagnostic for `Error` tokens
    pub message: Option<&'static str>,
}

impl Token {
    pub fn new(token_type: TokenType, start: usize, end: usize) -> Self {
        Self {
            token_type,
            start,
            end,
            message: None,
        }
    }

    fn error(message: &'static str, offset: usize) -> Self {
        Self {
            token_type: TokenType::Error,
            start: offset,
            end: offset,
            message: Some(message),
        }
    }

    /// Slice this token's text out of the input it was lexed from.
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        input.get(self.start..self.end).unwrap_or("")
    }
}

/// Error produced when the lexer encounters invalid input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct LexerError {
    pub message: String,
    /// Byte offset of the scan position where lexing stopped
    pub offset: usize,
}

impl LexerError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

lazy_static::lazy_static! {
    /// Single-character operators
    static ref SINGLE_CHAR_OPS: HashMap<char, TokenType> = {
        let mut m = HashMap::new();
        m.insert('|', TokenType::Pipe);
        m.insert('&', TokenType::Amp);
        m.insert(';', TokenType::Semicolon);
        m.insert('<', TokenType::Less);
        m.insert('>', TokenType::Great);
        m
    };
}

/// Whitespace that separates atoms
fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0b' | '\r' | '\n' | '\x0c')
}

/// Check if a character ends a bare word
fn is_word_boundary(c: char) -> bool {
    is_blank(c) || SINGLE_CHAR_OPS.contains_key(&c)
}

/// Control characters that have no meaning outside of quotes
fn is_unrecognized(c: char) -> bool {
    c.is_ascii_control() && !is_blank(c)
}

/// Lexer over one command line.
///
/// Iterating yields tokens until (and including) a terminal `Eol` or `Error`
/// token; after that the iterator is exhausted. Build a new lexer to scan
/// again.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            done: false,
        }
    }

    /// Tokenize the entire input.
    ///
    /// The returned vector always ends with an `Eol` token.
    pub fn tokenize(self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        for token in self {
            if token.token_type == TokenType::Error {
                return Err(LexerError::new(
                    token.message.unwrap_or("invalid input"),
                    token.start,
                ));
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn current(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current() {
            if !is_blank(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.pos;

        let c = match self.current() {
            Some(c) => c,
            None => return Token::new(TokenType::Eol, start, start),
        };

        if let Some(&op) = SINGLE_CHAR_OPS.get(&c) {
            self.pos += 1;
            return Token::new(op, start, self.pos);
        }

        if c == '\'' || c == '"' {
            return self.read_quoted(c);
        }

        self.read_word()
    }

    fn read_quoted(&mut self, quote: char) -> Token {
        self.advance();
        let content_start = self.pos;
        while let Some(c) = self.advance() {
            if c == quote {
                return Token::new(TokenType::Atom, content_start, self.pos - 1);
            }
        }
        Token::error("unterminated quote", self.pos)
    }

    fn read_word(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.current() {
            if is_word_boundary(c) {
                break;
            }
            if is_unrecognized(c) {
                return Token::error("unrecognized character", self.pos);
            }
            self.pos += c.len_utf8();
        }
        Token::new(TokenType::Atom, start, self.pos)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        if matches!(token.token_type, TokenType::Eol | TokenType::Error) {
            self.done = true;
        }
        Some(token)
    }
}

impl FusedIterator for Lexer<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenType> {
        Lexer::new(input).map(|t| t.token_type).collect()
    }

    #[test]
    fn test_simple_command() {
        let input = "echo hello";
        let tokens = Lexer::new(input).tokenize().unwrap();
        assert_eq!(tokens.len(), 3); // echo, hello, EOL
        assert_eq!(tokens[0].text(input), "echo");
        assert_eq!(tokens[1].text(input), "hello");
        assert_eq!(tokens[2].token_type, TokenType::Eol);
    }

    #[test]
    fn test_pipeline_redirect_background() {
        let input = "echo hi | cat > out.txt &";
        let tokens = Lexer::new(input).tokenize().unwrap();
        let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            types,
            vec![
                TokenType::Atom,
                TokenType::Atom,
                TokenType::Pipe,
                TokenType::Atom,
                TokenType::Great,
                TokenType::Atom,
                TokenType::Amp,
                TokenType::Eol,
            ]
        );
        let atoms: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::Atom)
            .map(|t| t.text(input))
            .collect();
        assert_eq!(atoms, vec!["echo", "hi", "cat", "out.txt"]);
    }

    #[test]
    fn test_operators_split_words() {
        assert_eq!(
            kinds("a|b;c<d>e&"),
            vec![
                TokenType::Atom,
                TokenType::Pipe,
                TokenType::Atom,
                TokenType::Semicolon,
                TokenType::Atom,
                TokenType::Less,
                TokenType::Atom,
                TokenType::Great,
                TokenType::Atom,
                TokenType::Amp,
                TokenType::Eol,
            ]
        );
    }

    #[test]
    fn test_single_quotes() {
        let input = "'a b' c";
        let tokens = Lexer::new(input).tokenize().unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text(input), "a b");
        assert_eq!((tokens[0].start, tokens[0].end), (1, 4));
        assert_eq!(tokens[1].text(input), "c");
    }

    #[test]
    fn test_double_quotes_are_verbatim() {
        let input = r#"echo "a | b \n ;""#;
        let tokens = Lexer::new(input).tokenize().unwrap();
        assert_eq!(tokens[1].token_type, TokenType::Atom);
        assert_eq!(tokens[1].text(input), r"a | b \n ;");
    }

    #[test]
    fn test_empty_quotes() {
        let input = "echo ''";
        let tokens = Lexer::new(input).tokenize().unwrap();
        assert_eq!(tokens[1].token_type, TokenType::Atom);
        assert_eq!(tokens[1].text(input), "");
    }

    #[test]
    fn test_unterminated_quote() {
        let input = "echo \"unterminated";
        let tokens: Vec<Token> = Lexer::new(input).collect();
        let last = tokens.last().unwrap();
        assert_eq!(last.token_type, TokenType::Error);
        assert_eq!(last.start, input.len());

        let err = Lexer::new(input).tokenize().unwrap_err();
        assert_eq!(err.message, "unterminated quote");
        assert_eq!(err.offset, input.len());
    }

    #[test]
    fn test_unrecognized_character() {
        let err = Lexer::new("echo a\u{1}b").tokenize().unwrap_err();
        assert_eq!(err.message, "unrecognized character");
        assert_eq!(err.offset, 6);
    }

    #[test]
    fn test_whitespace_variants() {
        let input = " \tls\x0b-l\r\n\x0c";
        let tokens = Lexer::new(input).tokenize().unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text(input), "ls");
        assert_eq!(tokens[1].text(input), "-l");
    }

    #[test]
    fn test_utf8_spans_are_byte_exact() {
        let input = "echo héllo 'ü ß'";
        let tokens = Lexer::new(input).tokenize().unwrap();
        assert_eq!(tokens[1].text(input), "héllo");
        assert_eq!(tokens[1].end - tokens[1].start, "héllo".len());
        assert_eq!(tokens[2].text(input), "ü ß");
    }

    #[test]
    fn test_empty_input() {
        let tokens = Lexer::new("   ").tokenize().unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token_type, TokenType::Eol);
        assert_eq!(tokens[0].start, 3);
    }

    #[test]
    fn test_stream_is_not_restartable() {
        let mut lexer = Lexer::new("a");
        assert_eq!(lexer.next().map(|t| t.token_type), Some(TokenType::Atom));
        assert_eq!(lexer.next().map(|t| t.token_type), Some(TokenType::Eol));
        assert_eq!(lexer.next(), None);
        assert_eq!(lexer.next(), None);
    }
}
