//! Scratchpad configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Table nesting depth shown when nothing else is configured.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Options controlling how outcomes are rendered back into a surface and how
/// environments are kept.
///
/// Every field has a default, so a partial JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix of captured `print` lines.
    pub output_prefix: String,
    /// Prefix of every line of the first returned value.
    pub result_prefix: String,
    /// Prefix of every line of the second and later returned values.
    pub continuation_prefix: String,
    /// Prefix of error lines.
    pub error_prefix: String,
    /// Render a literal `nil` when a snippet neither returns nor prints anything.
    pub show_nil: bool,
    /// Keep one blank line between a rendered block and the text after it.
    pub blank_separator: bool,
    /// Keep a surface's environment after the surface is discarded, and
    /// create it as soon as the surface is opened.
    pub persist_environments: bool,
    /// Table nesting depth after which contents are elided.
    pub max_depth: usize,
    /// Joins the arguments of a single `print` call.
    pub print_separator: String,
    /// Keep the `stack traceback:` tail of runtime errors.
    pub traceback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_prefix: "--| ".to_string(),
            result_prefix: "--> ".to_string(),
            continuation_prefix: "--, ".to_string(),
            error_prefix: "--! ".to_string(),
            show_nil: true,
            blank_separator: true,
            persist_environments: false,
            max_depth: DEFAULT_MAX_DEPTH,
            print_separator: "\t".to_string(),
            traceback: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate a config given as an already parsed JSON value, such as LSP
    /// initialization options.
    pub fn from_json_value(value: serde_json::Value) -> crate::Result<Self> {
        let config: Config = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn prefixes(
        mut self,
        output: impl Into<String>,
        result: impl Into<String>,
        continuation: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        self.output_prefix = output.into();
        self.result_prefix = result.into();
        self.continuation_prefix = continuation.into();
        self.error_prefix = error.into();
        self
    }

    pub fn show_nil(mut self, show_nil: bool) -> Self {
        self.show_nil = show_nil;
        self
    }

    pub fn blank_separator(mut self, blank_separator: bool) -> Self {
        self.blank_separator = blank_separator;
        self
    }

    pub fn persist_environments(mut self, persist: bool) -> Self {
        self.persist_environments = persist;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn print_separator(mut self, separator: impl Into<String>) -> Self {
        self.print_separator = separator.into();
        self
    }

    pub fn traceback(mut self, traceback: bool) -> Self {
        self.traceback = traceback;
        self
    }

    /// The four annotation prefixes, in role order: output, result,
    /// continuation, error.
    pub fn all_prefixes(&self) -> [&str; 4] {
        [
            &self.output_prefix,
            &self.result_prefix,
            &self.continuation_prefix,
            &self.error_prefix,
        ]
    }

    /// Check that annotation lines can be told apart by prefix alone.
    ///
    /// Prefixes must be non-blank and no prefix may start with another one,
    /// otherwise a rendered line could be classified under the wrong role.
    pub fn validate(&self) -> crate::Result<()> {
        let prefixes = self.all_prefixes();
        for prefix in prefixes {
            if prefix.trim().is_empty() {
                return Err(Error::config("annotation prefixes must not be blank"));
            }
        }
        for (i, a) in prefixes.iter().enumerate() {
            for b in prefixes.iter().skip(i + 1) {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(Error::config(format!(
                        "annotation prefixes {:?} and {:?} overlap",
                        a, b
                    )));
                }
            }
        }
        Ok(())
    }
}
