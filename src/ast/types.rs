//! Abstract Syntax Tree (AST) Types for Command Lines
//!
//! The tree is binary-branching: sequencing and backgrounding form a
//! right-leaning spine of statements, each statement is a right-leaning
//! chain of pipeline stages, and each stage is a simple command optionally
//! wrapped in one redirection.
//!
//! Nodes keep [`Token`]s rather than strings; word text is sliced out of the
//! original command line when the tree is executed.

use crate::parser::lexer::Token;

/// A simple command: the command word followed by its arguments, in source
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub words: Vec<Token>,
}

impl CommandNode {
    pub fn new(words: Vec<Token>) -> Self {
        Self { words }
    }

    /// Materialize the argument vector against the source line.
    pub fn argv(&self, input: &str) -> Vec<String> {
        self.words
            .iter()
            .map(|word| word.text(input).to_string())
            .collect()
    }
}

/// Union of all node types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
    /// `word word ...`
    Cmd(CommandNode),
    /// `left & right?`
    Background {
        left: Box<AstNode>,
        right: Option<Box<AstNode>>,
    },
    /// `left ; right?`
    Seq {
        left: Box<AstNode>,
        right: Option<Box<AstNode>>,
    },
    /// `command < target`
    RedirIn { target: Token, command: Box<AstNode> },
    /// `command > target`
    RedirOut { target: Token, command: Box<AstNode> },
    /// `left | right`
    Pipe { left: Box<AstNode>, right: Box<AstNode> },
}

impl AstNode {
    pub fn command(words: Vec<Token>) -> Self {
        Self::Cmd(CommandNode::new(words))
    }

    pub fn background(left: AstNode, right: Option<AstNode>) -> Self {
        Self::Background {
            left: Box::new(left),
            right: right.map(Box::new),
        }
    }

    pub fn seq(left: AstNode, right: Option<AstNode>) -> Self {
        Self::Seq {
            left: Box::new(left),
            right: right.map(Box::new),
        }
    }

    pub fn redir_in(target: Token, command: AstNode) -> Self {
        Self::RedirIn {
            target,
            command: Box::new(command),
        }
    }

    pub fn redir_out(target: Token, command: AstNode) -> Self {
        Self::RedirOut {
            target,
            command: Box::new(command),
        }
    }

    pub fn pipe(left: AstNode, right: AstNode) -> Self {
        Self::Pipe {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Short node name, used in debug logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cmd(_) => "CMD",
            Self::Background { .. } => "BACKGROUND",
            Self::Seq { .. } => "SEQ",
            Self::RedirIn { .. } => "REDIR_IN",
            Self::RedirOut { .. } => "REDIR_OUT",
            Self::Pipe { .. } => "PIPE",
        }
    }

    /// Argument vectors of every command in the tree, left to right.
    pub fn argv_lists(&self, input: &str) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        self.collect_argv(input, &mut out);
        out
    }

    fn collect_argv(&self, input: &str, out: &mut Vec<Vec<String>>) {
        match self {
            Self::Cmd(cmd) => out.push(cmd.argv(input)),
            Self::Background { left, right } | Self::Seq { left, right } => {
                left.collect_argv(input, out);
                if let Some(right) = right {
                    right.collect_argv(input, out);
                }
            }
            Self::RedirIn { command, .. } | Self::RedirOut { command, .. } => {
                command.collect_argv(input, out)
            }
            Self::Pipe { left, right } => {
                left.collect_argv(input, out);
                right.collect_argv(input, out);
            }
        }
    }
}
