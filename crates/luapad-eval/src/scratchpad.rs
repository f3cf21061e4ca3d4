//! The context object a host owns: one Lua state, its configuration, and
//! the environments of every surface evaluated so far.
//!
//! Region evaluation is a single pass over the surface: drop the annotation
//! a previous run left right after the region, evaluate the region's text,
//! and insert the freshly rendered block in its place.

use mlua::{Lua, Table};

use crate::block::{find_code_block, is_blank};
use crate::config::Config;
use crate::environment::{Environment, EnvironmentRegistry, SurfaceId};
use crate::error::Error;
use crate::evaluator::{Evaluator, Outcome};
use crate::render::{LineRole, Renderer};
use crate::surface::TextSurface;

/// What a region evaluation wrote into the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Insertion {
    lines: usize,
    separator: bool,
}

pub struct Scratchpad {
    lua: Lua,
    config: Config,
    registry: EnvironmentRegistry,
}

impl Scratchpad {
    /// Create a scratchpad with a fresh Lua state.
    pub fn new(config: Config) -> crate::Result<Self> {
        Self::with_lua(Lua::new(), config)
    }

    /// Create a scratchpad around an existing Lua state, whose globals
    /// become the namespace every environment reads through to.
    pub fn with_lua(lua: Lua, config: Config) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            lua,
            config,
            registry: EnvironmentRegistry::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared global namespace.
    pub fn globals(&self) -> Table {
        self.lua.globals()
    }

    /// Make sure the surface has an environment and mark it active.
    pub fn open_or_create_surface_state(&mut self, surface: &SurfaceId) -> crate::Result<Environment> {
        Ok(self.registry.get_or_create(&self.lua, surface)?)
    }

    pub fn environment(&self, surface: &SurfaceId) -> Option<&Environment> {
        self.registry.get(surface)
    }

    /// Drop the surface's bindings without touching its text.
    pub fn reset_environment(&mut self, surface: &SurfaceId) {
        self.registry.reset(surface);
    }

    /// The surface was closed. Its environment goes away unless
    /// environments are configured to persist.
    pub fn discard_surface(&mut self, surface: &SurfaceId) {
        if self.config.persist_environments {
            self.registry.deactivate(surface);
        } else {
            self.registry.forget(surface);
        }
    }

    /// The surface evaluated or opened most recently.
    pub fn active_surface(&self) -> Option<&SurfaceId> {
        self.registry.active()
    }

    /// Evaluate text in the surface's environment without editing anything.
    pub fn evaluate_source(&mut self, surface: &SurfaceId, source: &str) -> crate::Result<Outcome> {
        let env = self.registry.get_or_create(&self.lua, surface)?;
        let outcome = Evaluator::new(&self.lua, &self.config)
            .chunk_name(surface)
            .evaluate(&env, source);
        Ok(outcome)
    }

    /// Evaluate lines `start..=end` and write the rendered outcome right
    /// after `end`, replacing the annotation a previous evaluation left
    /// there. Returns the number of lines inserted.
    pub fn evaluate_region(
        &mut self,
        surface: &SurfaceId,
        text: &mut dyn TextSurface,
        start: usize,
        end: usize,
    ) -> crate::Result<usize> {
        Ok(self.evaluate_range(surface, text, start, end)?.lines)
    }

    /// Evaluate a single line. Blank lines and annotation lines are skipped.
    pub fn evaluate_line(
        &mut self,
        surface: &SurfaceId,
        text: &mut dyn TextSurface,
        line: usize,
    ) -> crate::Result<usize> {
        let content = text.line(line).ok_or(Error::LineOutOfRange {
            line,
            len: text.line_count(),
        })?;
        if is_blank(&content) || LineRole::classify(&content, &self.config).is_some() {
            return Ok(0);
        }
        self.evaluate_region(surface, text, line, line)
    }

    /// Evaluate the paragraph of code lines around `line`.
    pub fn evaluate_block(
        &mut self,
        surface: &SurfaceId,
        text: &mut dyn TextSurface,
        line: usize,
    ) -> crate::Result<usize> {
        if line >= text.line_count() {
            return Err(Error::LineOutOfRange {
                line,
                len: text.line_count(),
            });
        }
        match self.locate_block(text, line) {
            Some((start, end)) => self.evaluate_region(surface, text, start, end),
            None => Ok(0),
        }
    }

    /// Evaluate the whole surface, placing the result after the last line
    /// of code. A trailing annotation from an earlier run is replaced.
    pub fn evaluate_all(&mut self, surface: &SurfaceId, text: &mut dyn TextSurface) -> crate::Result<usize> {
        let lines = text.lines(0, text.line_count());
        let last_code = lines
            .iter()
            .rposition(|line| !is_blank(line) && LineRole::classify(line, &self.config).is_none());
        match last_code {
            Some(end) => self.evaluate_region(surface, text, 0, end),
            None => Ok(0),
        }
    }

    /// Evaluate the block under the cursor and move the cursor past the
    /// inserted annotation, onto the separator line when one was added.
    pub fn evaluate_at_cursor(&mut self, surface: &SurfaceId, text: &mut dyn TextSurface) -> crate::Result<usize> {
        let (line, _) = text.cursor();
        let Some((start, end)) = self.locate_block(text, line) else {
            return Ok(0);
        };
        let insertion = self.evaluate_range(surface, text, start, end)?;
        let mut target = end + 1 + insertion.lines;
        if insertion.separator {
            target -= 1;
        }
        text.set_cursor(target, 0);
        Ok(insertion.lines)
    }

    fn evaluate_range(
        &mut self,
        surface: &SurfaceId,
        text: &mut dyn TextSurface,
        start: usize,
        end: usize,
    ) -> crate::Result<Insertion> {
        let removed = self.remove_stale_block(text, end);
        if removed > 0 {
            tracing::debug!(surface = %surface, removed, "removed previous annotation");
        }

        let total = text.line_count();
        if start > end || start >= total {
            return Ok(Insertion {
                lines: 0,
                separator: false,
            });
        }
        let end = end.min(total - 1);
        let source = text.lines(start, end + 1).join("\n");

        let outcome = self.evaluate_source(surface, &source)?;
        let block = Renderer::new(&self.config).render(&outcome);
        let mut lines = block.to_lines(&self.config);

        let after = end + 1;
        let separator = self.config.blank_separator
            && !text.line(after).is_some_and(|line| is_blank(&line));
        if separator {
            lines.push(String::new());
        }

        let inserted = lines.len();
        text.replace_lines(after, after, lines);
        tracing::debug!(surface = %surface, start, end, inserted, "region evaluated");
        Ok(Insertion {
            lines: inserted,
            separator,
        })
    }

    /// Delete the annotation directly after line `end`, plus the blank
    /// separator that follows it. Without an annotation, a lone blank line
    /// right after the region is taken out so it can be put back fresh.
    /// Returns the number of lines deleted.
    fn remove_stale_block(&self, text: &mut dyn TextSurface, end: usize) -> usize {
        let total = text.line_count();
        let first = end.saturating_add(1);
        if first >= total {
            return 0;
        }

        let mut last = first;
        while last < total
            && text
                .line(last)
                .is_some_and(|line| LineRole::classify(&line, &self.config).is_some())
        {
            last += 1;
        }

        let followed_by_blank = |index: usize| {
            index < total && text.line(index).is_some_and(|line| is_blank(&line))
        };
        if self.config.blank_separator && followed_by_blank(last) {
            last += 1;
        }

        if last > first {
            text.replace_lines(first, last, Vec::new());
        }
        last - first
    }

    /// The code block around `line`. Annotations left by earlier runs are
    /// not part of it, so re-evaluating a block replaces its annotation.
    fn locate_block(&self, text: &dyn TextSurface, line: usize) -> Option<(usize, usize)> {
        let lines = text.lines(0, text.line_count());
        find_code_block(&lines, line, |entry| {
            LineRole::classify(entry, &self.config).is_some()
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::LineBuffer;

    fn pad() -> Scratchpad {
        Scratchpad::new(Config::default()).unwrap()
    }

    fn buffer(lines: &[&str]) -> LineBuffer {
        lines.iter().copied().collect()
    }

    #[test]
    fn test_evaluate_region_inserts_after_end() {
        let mut pad = pad();
        let surface = SurfaceId::from("s");
        let mut text = buffer(&["x = 2", "print(x * 21)", "", "tail()"]);
        let inserted = pad.evaluate_region(&surface, &mut text, 0, 1).unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(
            text.as_lines(),
            ["x = 2", "print(x * 21)", "--| 42", "--> 2", "", "tail()"]
        );
    }

    #[test]
    fn test_separator_not_added_before_blank() {
        let mut pad = pad();
        let surface = SurfaceId::from("s");
        let mut text = buffer(&["1", "", "", "2"]);
        // The first blank is taken as a separator and re-added; the second stays.
        let inserted = pad.evaluate_region(&surface, &mut text, 0, 0).unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(text.as_lines(), ["1", "--> 1", "", "2"]);
    }

    #[test]
    fn test_no_separator_when_disabled() {
        let mut pad = Scratchpad::new(Config::default().blank_separator(false)).unwrap();
        let surface = SurfaceId::from("s");
        let mut text = buffer(&["1", "2"]);
        assert_eq!(pad.evaluate_region(&surface, &mut text, 0, 0).unwrap(), 1);
        assert_eq!(text.as_lines(), ["1", "--> 1", "2"]);
        assert_eq!(pad.evaluate_region(&surface, &mut text, 0, 0).unwrap(), 1);
        assert_eq!(text.as_lines(), ["1", "--> 1", "2"]);
    }

    #[test]
    fn test_empty_range() {
        let mut pad = pad();
        let surface = SurfaceId::from("s");
        let mut text = buffer(&["1"]);
        assert_eq!(pad.evaluate_region(&surface, &mut text, 3, 4).unwrap(), 0);
        assert_eq!(pad.evaluate_region(&surface, &mut text, 1, 0).unwrap(), 0);
        assert_eq!(text.as_lines(), ["1"]);
    }

    #[test]
    fn test_evaluate_line_skips_blank() {
        let mut pad = pad();
        let surface = SurfaceId::from("s");
        let mut text = buffer(&["", "1"]);
        assert_eq!(pad.evaluate_line(&surface, &mut text, 0).unwrap(), 0);
        assert_eq!(text.as_lines(), ["", "1"]);
        assert!(matches!(
            pad.evaluate_line(&surface, &mut text, 5),
            Err(Error::LineOutOfRange { line: 5, len: 2 })
        ));
    }

    #[test]
    fn test_evaluate_all_replaces_trailing_annotation() {
        let mut pad = pad();
        let surface = SurfaceId::from("s");
        let mut text = buffer(&["a = 1", "", "print(a + 1)"]);
        assert_eq!(pad.evaluate_all(&surface, &mut text).unwrap(), 3);
        let first = text.clone();
        assert_eq!(first.as_lines(), ["a = 1", "", "print(a + 1)", "--| 2", "--> 1", ""]);
        assert_eq!(pad.evaluate_all(&surface, &mut text).unwrap(), 3);
        assert_eq!(text, first);
    }

    #[test]
    fn test_evaluate_at_cursor_moves_cursor() {
        let mut pad = pad();
        let surface = SurfaceId::from("s");
        let mut text = buffer(&["x = 1", "", "y = 2", "print(y)"]);
        text.set_cursor(3, 0);
        let inserted = pad.evaluate_at_cursor(&surface, &mut text).unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(
            text.as_lines(),
            ["x = 1", "", "y = 2", "print(y)", "--| 2", "--> 2", ""]
        );
        assert_eq!(text.cursor(), (6, 0));
    }

    #[test]
    fn test_discard_respects_persistence() {
        let surface = SurfaceId::from("s");

        let mut pad = pad();
        pad.open_or_create_surface_state(&surface).unwrap();
        pad.discard_surface(&surface);
        assert!(pad.environment(&surface).is_none());
        assert!(pad.active_surface().is_none());

        let mut pad = Scratchpad::new(Config::default().persist_environments(true)).unwrap();
        pad.open_or_create_surface_state(&surface).unwrap();
        pad.discard_surface(&surface);
        assert!(pad.environment(&surface).is_some());
        assert!(pad.active_surface().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config::default().prefixes("--", "-->", "--,", "--!");
        assert!(matches!(Scratchpad::new(config), Err(Error::Config(_))));
    }
}
