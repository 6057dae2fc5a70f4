use thiserror::Error;

/// Errors raised by the compiler and the runtime. Public entry points return
/// `anyhow::Result`; callers that care about the kind can `downcast_ref`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
  #[error("lex error at {line}:{col}: unexpected input {text:?}")]
  Lex { line: usize, col: usize, text: String },

  #[error("parse error at {line}:{col}: expected {expected}")]
  Parse { line: usize, col: usize, expected: String },

  #[error("{pass}: {message}: {node}")]
  Compile {
    pass: &'static str,
    message: String,
    node: String,
  },

  #[error("Enumerate can only be used with distributions that have finite support, got {0}")]
  NoSupport(String),

  #[error("Enumerate encountered a distribution with empty support: {0}")]
  EmptySupport(String),

  #[error("all paths explored by Enumerate have probability zero")]
  ZeroProbability,

  #[error("factor allowed only inside inference")]
  FactorOutsideInference,

  #[error("invalid options for {who}: {message}")]
  Options { who: &'static str, message: String },

  #[error("type error: {0}")]
  Type(String),

  #[error("{0} is not defined")]
  Unbound(String),

  #[error("continuation of a finished {0} was invoked")]
  StaleContinuation(&'static str),

  #[error("execution cancelled")]
  Cancelled,
}

impl Error {
  pub fn compile(pass: &'static str, message: impl Into<String>, node: impl ToString) -> Self {
    Error::Compile {
      pass,
      message: message.into(),
      node: node.to_string(),
    }
  }

  pub fn ty(message: impl Into<String>) -> Self {
    Error::Type(message.into())
  }

  pub fn options(who: &'static str, message: impl Into<String>) -> Self {
    Error::Options {
      who,
      message: message.into(),
    }
  }
}
