//! Formatting outcomes as annotation lines.

use crate::config::Config;
use crate::evaluator::Outcome;
use crate::value::Value;

/// What an annotation line shows. Each role has its own prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    /// Captured `print` output.
    Output,
    /// A line of the first returned value.
    Result,
    /// A line of a later returned value.
    Continuation,
    Error,
}

impl LineRole {
    const ALL: [LineRole; 4] = [
        LineRole::Output,
        LineRole::Result,
        LineRole::Continuation,
        LineRole::Error,
    ];

    pub fn prefix(self, config: &Config) -> &str {
        match self {
            LineRole::Output => &config.output_prefix,
            LineRole::Result => &config.result_prefix,
            LineRole::Continuation => &config.continuation_prefix,
            LineRole::Error => &config.error_prefix,
        }
    }

    /// Recognise a previously rendered line by its prefix.
    ///
    /// A prefix with trailing whitespace also matches the bare line an
    /// editor leaves after trimming trailing whitespace off an empty entry.
    pub fn classify(line: &str, config: &Config) -> Option<LineRole> {
        if line.trim().is_empty() {
            return None;
        }
        LineRole::ALL.into_iter().find(|role| {
            let prefix = role.prefix(config);
            line.starts_with(prefix) || line == prefix.trim_end()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub role: LineRole,
    /// Line text without its prefix.
    pub text: String,
}

/// The annotation written after an evaluated region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedBlock {
    lines: Vec<RenderedLine>,
}

impl RenderedBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text`, one line per embedded newline, all under `role`.
    pub fn push(&mut self, role: LineRole, text: &str) {
        for line in text.split('\n') {
            self.lines.push(RenderedLine {
                role,
                text: line.to_string(),
            });
        }
    }

    pub fn lines(&self) -> &[RenderedLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The block as surface lines, each with its role's prefix.
    pub fn to_lines(&self, config: &Config) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| format!("{}{}", line.role.prefix(config), line.text))
            .collect()
    }
}

/// Turns outcomes into rendered blocks.
pub struct Renderer<'a> {
    config: &'a Config,
}

impl<'a> Renderer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn render(&self, outcome: &Outcome) -> RenderedBlock {
        match outcome {
            Outcome::Success { values, output } => self.render_success(values, output),
            Outcome::Failure { message, .. } => self.render_failure(message),
        }
    }

    /// Output lines first, then one group of lines per returned value.
    pub fn render_success(&self, values: &[Value], output: &[String]) -> RenderedBlock {
        let mut block = RenderedBlock::new();
        for entry in output {
            block.push(LineRole::Output, entry);
        }
        for (i, value) in values.iter().enumerate() {
            let role = if i == 0 {
                LineRole::Result
            } else {
                LineRole::Continuation
            };
            block.push(role, &value.inspect());
        }
        if values.is_empty() && output.is_empty() && self.config.show_nil {
            block.push(LineRole::Result, "nil");
        }
        block
    }

    pub fn render_failure(&self, message: &str) -> RenderedBlock {
        let mut block = RenderedBlock::new();
        block.push(LineRole::Error, message);
        block
    }
}
