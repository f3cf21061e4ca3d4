//! Compiling and running snippets against an environment.
//!
//! A snippet is first tried as an expression (`return <snippet>`). If that
//! does not compile it is rewritten by [`crate::transform::rewrite`] and
//! compiled as statements. When the rewrite does not compile (the snippet
//! already ends in `return`, say) the text is compiled as written. The compiled
//! chunk runs with `print` captured, and every outcome, failures included,
//! comes back as an [`Outcome`] rather than an error.

use mlua::{Function, Lua, MultiValue};

use crate::capture::PrintCapture;
use crate::config::Config;
use crate::environment::Environment;
use crate::error::Error;
use crate::transform;
use crate::value::{Converter, Value};

const TRACEBACK_MARKER: &str = "\nstack traceback:";

/// Which stage a failed evaluation stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Compile,
    Runtime,
}

/// The result of evaluating one snippet.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        /// Values returned by the snippet, possibly none.
        values: Vec<Value>,
        /// One entry per `print` call, in call order.
        output: Vec<String>,
    },
    Failure { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    fn from_error(error: Error) -> Self {
        match error {
            Error::Compile(message) => Outcome::Failure {
                kind: FailureKind::Compile,
                message,
            },
            Error::Runtime(message) => Outcome::Failure {
                kind: FailureKind::Runtime,
                message,
            },
            other => Outcome::Failure {
                kind: FailureKind::Runtime,
                message: other.to_string(),
            },
        }
    }
}

/// Evaluates snippets in a Lua state.
pub struct Evaluator<'a> {
    lua: &'a Lua,
    config: &'a Config,
    chunk_name: String,
}

impl<'a> Evaluator<'a> {
    pub fn new(lua: &'a Lua, config: &'a Config) -> Self {
        Self {
            lua,
            config,
            chunk_name: "=luapad".to_string(),
        }
    }

    /// Name used in error positions (`<name>:<line>: message`).
    pub fn chunk_name(mut self, name: impl std::fmt::Display) -> Self {
        self.chunk_name = format!("={}", name);
        self
    }

    /// Evaluate `source` in `env`.
    ///
    /// Bindings made before a runtime error stay in the environment.
    pub fn evaluate(&self, env: &Environment, source: &str) -> Outcome {
        match self.run(env, source) {
            Ok((values, output)) => Outcome::Success { values, output },
            Err(e) => {
                tracing::debug!(chunk = %self.chunk_name, "evaluation failed: {}", e);
                Outcome::from_error(e)
            }
        }
    }

    fn run(&self, env: &Environment, source: &str) -> crate::Result<(Vec<Value>, Vec<String>)> {
        let function = self.compile(env, source)?;

        let capture = PrintCapture::install(self.lua, env, &self.config.print_separator)?;
        let result = function.call::<MultiValue>(());
        let output = capture.take_lines();
        drop(capture);

        let returned = result.map_err(|e| Error::Runtime(self.runtime_message(e)))?;
        let mut converter = Converter::new(self.config.max_depth);
        let values = returned
            .iter()
            .map(|value| converter.convert(value))
            .collect::<mlua::Result<Vec<_>>>()?;
        Ok((values, output))
    }

    fn compile(&self, env: &Environment, source: &str) -> crate::Result<Function> {
        let expression = format!("return {}", source);
        match self.load(env, &expression) {
            Ok(function) => return Ok(function),
            Err(e) => tracing::debug!("not an expression: {}", compile_message(e)),
        }

        let rewritten = transform::rewrite(source);
        if rewritten != source {
            tracing::trace!(source = %rewritten, "compiling rewritten snippet");
            match self.load(env, &rewritten) {
                Ok(function) => return Ok(function),
                Err(e) => tracing::debug!("rewrite does not compile: {}", compile_message(e)),
            }
        }
        self.load(env, source)
            .map_err(|e| Error::Compile(compile_message(e)))
    }

    fn load(&self, env: &Environment, text: &str) -> mlua::Result<Function> {
        self.lua
            .load(text)
            .set_name(self.chunk_name.as_str())
            .set_environment(env.table().clone())
            .into_function()
    }

    fn runtime_message(&self, error: mlua::Error) -> String {
        let message = match error {
            mlua::Error::RuntimeError(message) => message,
            mlua::Error::CallbackError { traceback, cause } => {
                if self.config.traceback {
                    format!("{}\n{}", cause, traceback)
                } else {
                    cause.to_string()
                }
            }
            other => other.to_string(),
        };
        if self.config.traceback {
            message
        } else {
            strip_traceback(&message).to_string()
        }
    }
}

fn compile_message(error: mlua::Error) -> String {
    match error {
        mlua::Error::SyntaxError { message, .. } => message,
        other => other.to_string(),
    }
}

fn strip_traceback(message: &str) -> &str {
    match message.find(TRACEBACK_MARKER) {
        Some(index) => &message[..index],
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Lua, Config) {
        (Lua::new(), Config::default())
    }

    fn success(outcome: Outcome) -> (Vec<Value>, Vec<String>) {
        match outcome {
            Outcome::Success { values, output } => (values, output),
            other => panic!("Expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_expression() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let (values, output) = success(Evaluator::new(&lua, &config).evaluate(&env, "1 + 2"));
        assert_eq!(values, vec![Value::Integer(3)]);
        assert!(output.is_empty());
    }

    #[test]
    fn test_multiple_returns() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let (values, _) = success(Evaluator::new(&lua, &config).evaluate(&env, "1, 'two', nil"));
        assert_eq!(
            values,
            vec![Value::Integer(1), Value::String("two".to_string()), Value::Nil]
        );
    }

    #[test]
    fn test_local_persists() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let evaluator = Evaluator::new(&lua, &config);
        let (values, _) = success(evaluator.evaluate(&env, "local x = 1"));
        assert_eq!(values, vec![Value::Integer(1)]);
        let (values, _) = success(evaluator.evaluate(&env, "x"));
        assert_eq!(values, vec![Value::Integer(1)]);
    }

    #[test]
    fn test_local_function_persists() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let evaluator = Evaluator::new(&lua, &config);
        let (values, _) = success(evaluator.evaluate(&env, "local function sq(n) return n * n end"));
        assert!(matches!(values.as_slice(), [Value::Function(_)]));
        let (values, _) = success(evaluator.evaluate(&env, "sq(7)"));
        assert_eq!(values, vec![Value::Integer(49)]);
    }

    #[test]
    fn test_statement_without_value() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let (values, output) = success(
            Evaluator::new(&lua, &config).evaluate(&env, "for i = 1, 3 do print(i) end"),
        );
        assert!(values.is_empty());
        assert_eq!(output, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_print_is_restored_after_error() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let outcome = Evaluator::new(&lua, &config).evaluate(&env, "print('x') error('boom')");
        assert!(!outcome.is_success());
        assert_eq!(env.get_local("print").unwrap(), Value::Nil);
    }

    #[test]
    fn test_runtime_error_message() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let outcome = Evaluator::new(&lua, &config)
            .chunk_name("scratch")
            .evaluate(&env, "error('boom')");
        match outcome {
            Outcome::Failure { kind, message } => {
                assert_eq!(kind, FailureKind::Runtime);
                assert_eq!(message, "scratch:1: boom");
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_error() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let outcome = Evaluator::new(&lua, &config).evaluate(&env, "local = = 3");
        match outcome {
            Outcome::Failure { kind, message } => {
                assert_eq!(kind, FailureKind::Compile);
                assert!(message.starts_with("luapad:1:"), "message: {}", message);
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_snippet_ending_in_return_runs_as_written() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let (values, _) = success(
            Evaluator::new(&lua, &config).evaluate(&env, "local n = 20\nn = n + 1\nreturn n * 2"),
        );
        assert_eq!(values, vec![Value::Integer(42)]);
    }

    #[test]
    fn test_partial_effects_survive_error() {
        let (lua, config) = setup();
        let env = Environment::new(&lua).unwrap();
        let evaluator = Evaluator::new(&lua, &config);
        assert!(!evaluator.evaluate(&env, "done = true\nerror('late')").is_success());
        assert_eq!(env.get("done").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_strip_traceback() {
        assert_eq!(strip_traceback("x:1: boom\nstack traceback:\n\t[C]: in ?"), "x:1: boom");
        assert_eq!(strip_traceback("plain"), "plain");
    }
}
