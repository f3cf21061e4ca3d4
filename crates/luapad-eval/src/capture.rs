//! Temporary `print` replacement that records output instead of writing it.

use std::sync::mpsc::{channel, Receiver, Sender};

use mlua::{Function, Lua, MultiValue, Value as LuaValue};

use crate::environment::Environment;

/// A sink for captured print lines.
pub type PrintSink = Sender<String>;

/// Installs a capturing `print` into an environment for the duration of one
/// call.
///
/// Dropping the guard puts back whatever the environment held under `print`
/// before (normally nothing, so lookups reach the global `print` again).
pub(crate) struct PrintCapture {
    env: Environment,
    previous: LuaValue,
    lines: Receiver<String>,
}

impl PrintCapture {
    pub(crate) fn install(lua: &Lua, env: &Environment, separator: &str) -> mlua::Result<Self> {
        let (sink, lines) = channel();
        let print = capturing_print(lua, sink, separator.to_string())?;
        let previous: LuaValue = env.table().raw_get("print")?;
        env.table().raw_set("print", print)?;
        Ok(Self {
            env: env.clone(),
            previous,
            lines,
        })
    }

    /// Lines printed so far, in call order.
    pub(crate) fn take_lines(&self) -> Vec<String> {
        self.lines.try_iter().collect()
    }
}

impl Drop for PrintCapture {
    fn drop(&mut self) {
        let previous = std::mem::replace(&mut self.previous, LuaValue::Nil);
        if let Err(e) = self.env.table().raw_set("print", previous) {
            tracing::warn!("failed to restore print: {}", e);
        }
    }
}

/// Build a `print` that stringifies its arguments with the global
/// `tostring` and sends one joined line per call to `sink`.
fn capturing_print(lua: &Lua, sink: PrintSink, separator: String) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        let tostring: Function = lua.globals().get("tostring")?;
        let mut parts = Vec::new();
        for arg in args {
            let text: mlua::String = tostring.call(arg)?;
            parts.push(String::from(text.to_string_lossy()));
        }
        sink.send(parts.join(&separator)).map_err(|e| {
            mlua::Error::RuntimeError(format!("print capture closed: {}", e))
        })?;
        Ok(())
    })
}
