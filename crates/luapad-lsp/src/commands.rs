//! `workspace/executeCommand` commands understood by the server.

use luapad_eval::{LineBuffer, Scratchpad, SurfaceId};
use serde_json::Value as JsonValue;
use tower_lsp::lsp_types::Url;

pub const EVALUATE_LINE: &str = "luapad.evaluateLine";
pub const EVALUATE_BLOCK: &str = "luapad.evaluateBlock";
pub const EVALUATE_RANGE: &str = "luapad.evaluateRange";
pub const EVALUATE_ALL: &str = "luapad.evaluateAll";
pub const RESET_ENVIRONMENT: &str = "luapad.resetEnvironment";

pub const ALL: [&str; 5] = [
    EVALUATE_LINE,
    EVALUATE_BLOCK,
    EVALUATE_RANGE,
    EVALUATE_ALL,
    RESET_ENVIRONMENT,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    EvaluateLine { uri: Url, line: usize },
    EvaluateBlock { uri: Url, line: usize },
    /// Inclusive line range.
    EvaluateRange { uri: Url, start: usize, end: usize },
    EvaluateAll { uri: Url },
    ResetEnvironment { uri: Url },
}

impl Command {
    /// Decode a command from its name and positional arguments. The first
    /// argument is always the document URI.
    pub fn parse(name: &str, arguments: &[JsonValue]) -> Result<Self, String> {
        let uri = uri_argument(arguments)?;
        match name {
            EVALUATE_LINE => Ok(Command::EvaluateLine {
                uri,
                line: line_argument(arguments, 1)?,
            }),
            EVALUATE_BLOCK => Ok(Command::EvaluateBlock {
                uri,
                line: line_argument(arguments, 1)?,
            }),
            EVALUATE_RANGE => {
                let start = line_argument(arguments, 1)?;
                let end = line_argument(arguments, 2)?;
                if start > end {
                    return Err(format!("range start {} is after end {}", start, end));
                }
                Ok(Command::EvaluateRange { uri, start, end })
            }
            EVALUATE_ALL => Ok(Command::EvaluateAll { uri }),
            RESET_ENVIRONMENT => Ok(Command::ResetEnvironment { uri }),
            other => Err(format!("unknown command: {}", other)),
        }
    }

    pub fn uri(&self) -> &Url {
        match self {
            Command::EvaluateLine { uri, .. }
            | Command::EvaluateBlock { uri, .. }
            | Command::EvaluateRange { uri, .. }
            | Command::EvaluateAll { uri }
            | Command::ResetEnvironment { uri } => uri,
        }
    }

    /// Whether running the command may rewrite the document.
    pub fn edits_document(&self) -> bool {
        !matches!(self, Command::ResetEnvironment { .. })
    }

    /// Run against `text`, returning the number of inserted lines.
    pub fn run(&self, pad: &mut Scratchpad, text: &mut LineBuffer) -> luapad_eval::Result<usize> {
        let surface = surface_id(self.uri());
        match self {
            Command::EvaluateLine { line, .. } => pad.evaluate_line(&surface, text, *line),
            Command::EvaluateBlock { line, .. } => pad.evaluate_block(&surface, text, *line),
            Command::EvaluateRange { start, end, .. } => {
                pad.evaluate_region(&surface, text, *start, *end)
            }
            Command::EvaluateAll { .. } => pad.evaluate_all(&surface, text),
            Command::ResetEnvironment { .. } => {
                pad.reset_environment(&surface);
                Ok(0)
            }
        }
    }
}

/// Every document gets its own environment, keyed by URI.
pub fn surface_id(uri: &Url) -> SurfaceId {
    SurfaceId::new(uri.as_str())
}

fn uri_argument(arguments: &[JsonValue]) -> Result<Url, String> {
    let raw = arguments
        .first()
        .and_then(JsonValue::as_str)
        .ok_or_else(|| "missing document URI argument".to_string())?;
    Url::parse(raw).map_err(|e| format!("invalid document URI {:?}: {}", raw, e))
}

fn line_argument(arguments: &[JsonValue], index: usize) -> Result<usize, String> {
    arguments
        .get(index)
        .and_then(JsonValue::as_u64)
        .map(|line| line as usize)
        .ok_or_else(|| format!("argument {} must be a line number", index))
}
