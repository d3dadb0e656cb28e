//! Recursive Descent Parser for Command Lines
//!
//! This parser consumes tokens from the lexer and produces an AST.
//!
//! Grammar:
//!   full_command ::= pipeline [ ('&' | ';') [full_command] ]
//!   pipeline     ::= command [ '|' pipeline ]
//!   command      ::= word_list [ ('>' | '<') ATOM ]
//!   word_list    ::= ATOM [word_list]
//!
//! Redirection binds tighter than `|`, which binds tighter than `&` and `;`.
//! All binary forms are right-recursive. A dangling `&` or `;` is only
//! accepted as the last token of the line.

use crate::ast::types::AstNode;
use crate::parser::lexer::{Lexer, Token, TokenType};
use crate::parser::types::{
    is_redirection_token, is_statement_separator, ParseError, MAX_INPUT_SIZE, MAX_PARSER_DEPTH,
};

/// Main parser struct
pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
}

impl<'t> Parser<'t> {
    /// Create a parser over a token stream (as produced by [`Lexer::tokenize`]).
    pub fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parse the whole token stream into one tree.
    ///
    /// Fails unless every token up to `Eol` is consumed.
    pub fn parse(mut self) -> Result<AstNode, ParseError> {
        let ast = self.parse_full_command()?;
        let current = self.current();
        if current.token_type != TokenType::Eol {
            return Err(ParseError::at_token(
                format!("trailing input near `{}'", current.token_type.as_str()),
                current.start,
                current.token_type,
            ));
        }
        Ok(ast)
    }

    // =========================================================================
    // HELPER METHODS
    // =========================================================================

    fn current(&self) -> Token {
        match self.tokens.get(self.pos) {
            Some(token) => *token,
            None => {
                let end = self.tokens.last().map(|t| t.end).unwrap_or(0);
                Token::new(TokenType::Eol, end, end)
            }
        }
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current().token_type == token_type
    }

    fn advance(&mut self) -> Token {
        let token = self.current();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token_type: TokenType, what: &str) -> Result<Token, ParseError> {
        if self.check(token_type) {
            return Ok(self.advance());
        }
        Err(self.unexpected(what))
    }

    fn unexpected(&self, what: &str) -> ParseError {
        let token = self.current();
        let message = match token.token_type {
            TokenType::Eol => format!("expected {}, found end of input", what),
            other => format!("expected {}, found `{}'", what, other.as_str()),
        };
        ParseError::at_token(message, token.start, token.token_type)
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            return Err(ParseError::new(
                format!("command line nests deeper than {} levels", MAX_PARSER_DEPTH),
                self.current().start,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // =========================================================================
    // GRAMMAR RULES
    // =========================================================================

    fn parse_full_command(&mut self) -> Result<AstNode, ParseError> {
        self.enter()?;
        let pipeline = self.parse_pipeline()?;

        let current = self.current();
        let node = if is_statement_separator(current.token_type) {
            self.advance();
            let rest = if self.check(TokenType::Eol) {
                None
            } else {
                Some(self.parse_full_command()?)
            };
            if current.token_type == TokenType::Amp {
                AstNode::background(pipeline, rest)
            } else {
                AstNode::seq(pipeline, rest)
            }
        } else {
            pipeline
        };

        self.leave();
        Ok(node)
    }

    fn parse_pipeline(&mut self) -> Result<AstNode, ParseError> {
        self.enter()?;
        let command = self.parse_command()?;

        let node = if self.check(TokenType::Pipe) {
            self.advance();
            let rest = self.parse_pipeline()?;
            AstNode::pipe(command, rest)
        } else {
            command
        };

        self.leave();
        Ok(node)
    }

    fn parse_command(&mut self) -> Result<AstNode, ParseError> {
        let command = self.parse_word_list()?;

        let op = self.current().token_type;
        if !is_redirection_token(op) {
            return Ok(command);
        }
        self.advance();
        let target = self.expect(TokenType::Atom, "redirection target")?;

        Ok(match op {
            TokenType::Great => AstNode::redir_out(target, command),
            _ => AstNode::redir_in(target, command),
        })
    }

    fn parse_word_list(&mut self) -> Result<AstNode, ParseError> {
        let mut words = vec![self.expect(TokenType::Atom, "a command")?];
        while self.check(TokenType::Atom) {
            words.push(self.advance());
        }
        Ok(AstNode::command(words))
    }
}

/// Parse a token stream into an AST.
pub fn parse(tokens: &[Token]) -> Result<AstNode, ParseError> {
    Parser::new(tokens).parse()
}

/// Tokenize and parse a command line.
///
/// Lexer failures are reported as a [`ParseError`] at the lexer's offset;
/// use [`Lexer::tokenize`] and [`parse`] separately to tell them apart.
pub fn parse_line(input: &str) -> Result<AstNode, ParseError> {
    if input.len() > MAX_INPUT_SIZE {
        return Err(ParseError::new(
            format!(
                "Input too large: {} bytes exceeds limit of {}",
                input.len(),
                MAX_INPUT_SIZE
            ),
            0,
        ));
    }
    let tokens = Lexer::new(input)
        .tokenize()
        .map_err(|e| ParseError::new(e.message, e.offset))?;
    parse(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(input: &str) -> Result<AstNode, ParseError> {
        let tokens = Lexer::new(input).tokenize().unwrap();
        parse(&tokens)
    }

    #[test]
    fn test_simple_command() {
        let input = "ls -la /tmp";
        let ast = parse_str(input).unwrap();
        match &ast {
            AstNode::Cmd(cmd) => assert_eq!(cmd.argv(input), vec!["ls", "-la", "/tmp"]),
            other => panic!("expected CMD, got {}", other.kind()),
        }
    }

    #[test]
    fn test_pipeline_is_right_leaning() {
        let input = "a | b | c";
        let ast = parse_str(input).unwrap();
        match &ast {
            AstNode::Pipe { left, right } => {
                assert!(matches!(**left, AstNode::Cmd(_)));
                match &**right {
                    AstNode::Pipe { left, right } => {
                        assert!(matches!(**left, AstNode::Cmd(_)));
                        assert!(matches!(**right, AstNode::Cmd(_)));
                    }
                    other => panic!("expected nested PIPE, got {}", other.kind()),
                }
            }
            other => panic!("expected PIPE, got {}", other.kind()),
        }
        assert_eq!(
            ast.argv_lists(input),
            vec![vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]
        );
    }

    #[test]
    fn test_background_is_right_recursive() {
        let input = "a & b & c";
        let ast = parse_str(input).unwrap();
        match &ast {
            AstNode::Background { left, right: Some(right) } => {
                assert!(matches!(**left, AstNode::Cmd(_)));
                assert!(matches!(**right, AstNode::Background { right: Some(_), .. }));
            }
            other => panic!("expected BACKGROUND, got {}", other.kind()),
        }
    }

    #[test]
    fn test_redirection_binds_tighter_than_pipe() {
        let input = "sort < in.txt | uniq > out.txt";
        let ast = parse_str(input).unwrap();
        match &ast {
            AstNode::Pipe { left, right } => {
                match &**left {
                    AstNode::RedirIn { target, command } => {
                        assert_eq!(target.text(input), "in.txt");
                        assert!(matches!(**command, AstNode::Cmd(_)));
                    }
                    other => panic!("expected REDIR_IN, got {}", other.kind()),
                }
                match &**right {
                    AstNode::RedirOut { target, .. } => assert_eq!(target.text(input), "out.txt"),
                    other => panic!("expected REDIR_OUT, got {}", other.kind()),
                }
            }
            other => panic!("expected PIPE, got {}", other.kind()),
        }
    }

    #[test]
    fn test_pipe_binds_tighter_than_sequence() {
        let input = "a | b ; c";
        let ast = parse_str(input).unwrap();
        match &ast {
            AstNode::Seq { left, right: Some(right) } => {
                assert!(matches!(**left, AstNode::Pipe { .. }));
                assert!(matches!(**right, AstNode::Cmd(_)));
            }
            other => panic!("expected SEQ, got {}", other.kind()),
        }
    }

    #[test]
    fn test_dangling_separator_at_end() {
        assert!(matches!(
            parse_str("sleep 1 &").unwrap(),
            AstNode::Background { right: None, .. }
        ));
        assert!(matches!(
            parse_str("echo a ;").unwrap(),
            AstNode::Seq { right: None, .. }
        ));
    }

    #[test]
    fn test_dangling_separator_not_at_end() {
        assert!(parse_str("a ; ;").is_err());
        assert!(parse_str("a & ; b").is_err());
        assert!(parse_str("; a").is_err());
    }

    #[test]
    fn test_trailing_input_after_redirection() {
        let input = "echo a > f b";
        let err = parse_str(input).unwrap_err();
        assert!(err.message.contains("trailing input"));
        assert_eq!(err.offset, input.len() - 1);
    }

    #[test]
    fn test_missing_operands() {
        let err = parse_str("echo hi |").unwrap_err();
        assert_eq!(err.token_type, Some(TokenType::Eol));
        let err = parse_str("| echo hi").unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(parse_str("cat <").is_err());
        assert!(parse_str("cat > | x").is_err());
        assert!(parse_str("").is_err());
    }

    #[test]
    fn test_only_one_redirection_per_command() {
        assert!(parse_str("cat < a > b").is_err());
    }

    #[test]
    fn test_parse_consumes_every_token() {
        for input in ["a", "a b c", "a | b", "a > f", "a < f | b > g & c ; d", "a;"] {
            assert!(parse_str(input).is_ok(), "failed to parse {input:?}");
        }
    }

    #[test]
    fn test_depth_limit() {
        let input = "a;".repeat(MAX_PARSER_DEPTH + 1);
        let err = parse_str(&input).unwrap_err();
        assert!(err.message.contains("nests deeper"));
    }

    #[test]
    fn test_parse_line_reports_lexer_errors() {
        let err = parse_line("echo 'oops").unwrap_err();
        assert_eq!(err.message, "unterminated quote");
        assert_eq!(err.offset, 10);
    }
}
