use crate::token::SourcePosition;
use crate::trigger::{Trigger, TriggerKey};
use std::fmt;

/// Errors raised while loading, compiling or decompiling a script.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IOError: {0}")]
    Io(#[from] std::io::Error),

    #[error("ConfigError: {0}")]
    Config(#[from] serde_json::Error),

    /// The script parsed to zero triggers.
    #[error("script contains no executable triggers")]
    EmptyProgram,

    #[error("compiled script version {major}.{minor} is incompatible")]
    IncompatibleVersion { major: i32, minor: i32 },

    #[error("DecodeError: {0}")]
    Decode(String),

    #[error("EncodeError: {0}")]
    Encode(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("PatternError: {0}")]
    Pattern(#[from] regex::Error),

    /// A background load task panicked or was cancelled.
    #[error("load was interrupted: {0}")]
    Interrupted(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub struct LexingError {
    pub(crate) message: String,
    pub(crate) position: SourcePosition,
}

impl std::error::Error for LexingError {}

impl LexingError {
    pub fn new(message: String, position: SourcePosition) -> Self {
        Self { message, position }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> SourcePosition {
        self.position
    }
}

impl fmt::Display for LexingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "LexingError: {}\n  --> {}:{}",
            self.message, self.position.line, self.position.column,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub(crate) message: String,
    pub(crate) position: SourcePosition,
    pub(crate) text: String,
}

impl std::error::Error for SyntaxError {}

impl SyntaxError {
    pub fn new(message: String, position: SourcePosition, text: String) -> Self {
        Self {
            message,
            position,
            text,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> SourcePosition {
        self.position
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SyntaxError: {} at {:?}\n  --> {}:{}",
            self.message, self.text, self.position.line, self.position.column,
        )
    }
}

/// Non-fatal problem found while reading script text.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Lexing(LexingError),
    Syntax(SyntaxError),
}

impl Diagnostic {
    pub fn position(&self) -> SourcePosition {
        match self {
            Diagnostic::Lexing(err) => err.position,
            Diagnostic::Syntax(err) => err.position,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Diagnostic::Lexing(err) => err.fmt(f),
            Diagnostic::Syntax(err) => err.fmt(f),
        }
    }
}

impl From<LexingError> for Diagnostic {
    fn from(err: LexingError) -> Self {
        Diagnostic::Lexing(err)
    }
}

impl From<SyntaxError> for Diagnostic {
    fn from(err: SyntaxError) -> Self {
        Diagnostic::Syntax(err)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VariableError {
    #[error("attempt to assign a value to constant '{0}'")]
    Constant(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("override of {key}'s handler owned by '{owner}' attempted by '{requester}'")]
    KeyOwned {
        key: TriggerKey,
        owner: String,
        requester: String,
    },
}

/// Failure raised from inside a trigger handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error("{trigger} expected another operand")]
    MissingOperand { trigger: Trigger },

    #[error("{trigger} expected {expected} but found {found}")]
    UnexpectedOperand {
        trigger: Trigger,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0}")]
    Custom(String),
}

/// Failure that aborted one trigger block. Sibling blocks keep running.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("no handler found for {trigger}")]
    HandlerNotFound { trigger: Trigger },

    #[error("handler for {trigger} failed: {source}")]
    Handler {
        trigger: Trigger,
        #[source]
        source: HandlerError,
    },

    /// The handler panicked; the panic is contained to its block.
    #[error("handler for {trigger} panicked: {message}")]
    HandlerPanicked { trigger: Trigger, message: String },

    #[error("loop {trigger} exceeded the limit of {limit} iterations")]
    LoopLimitExceeded { trigger: Trigger, limit: u32 },

    #[error("block exceeded the limit of {limit} trigger executions at {trigger}")]
    TriggerLimitExceeded { trigger: Trigger, limit: u32 },

    #[error("block run was interrupted: {0}")]
    Interrupted(String),
}

impl ExecutionError {
    /// Trigger being executed when the block was aborted.
    pub fn trigger(&self) -> Trigger {
        match self {
            ExecutionError::HandlerNotFound { trigger }
            | ExecutionError::Handler { trigger, .. }
            | ExecutionError::HandlerPanicked { trigger, .. }
            | ExecutionError::LoopLimitExceeded { trigger, .. }
            | ExecutionError::TriggerLimitExceeded { trigger, .. } => *trigger,
            ExecutionError::Interrupted(_) => Trigger::UNDEFINED,
        }
    }
}
