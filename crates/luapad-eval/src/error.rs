//! Error types for the evaluator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The snippet failed to compile, both as an expression and as rewritten statements.
    #[error("{0}")]
    Compile(String),

    /// The compiled snippet raised while running.
    #[error("{0}")]
    Runtime(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The Lua host failed outside of running user code.
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("line {line} is out of range for a surface of {len} lines")]
    LineOutOfRange { line: usize, len: usize },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}
