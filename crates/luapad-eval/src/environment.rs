//! Per-surface execution environments.
//!
//! Every surface evaluates against its own Lua table. Lookups of names the
//! table does not hold fall through to the globals of the shared Lua state at
//! lookup time; assignments always land in the surface's table.

use std::collections::HashMap;
use std::fmt;

use mlua::{IntoLua, Lua, Table, Value as LuaValue};

use crate::config::DEFAULT_MAX_DEPTH;
use crate::value::{Converter, Value};

/// Identifies one surface (a buffer, a file, a document URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SurfaceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SurfaceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The namespace one surface's snippets run in.
///
/// A handle: clones refer to the same Lua table.
#[derive(Clone)]
pub struct Environment {
    table: Table,
}

impl Environment {
    /// Create an empty environment reading through to `lua`'s globals.
    ///
    /// The table's `_G` field points at the table itself so snippets can
    /// introspect their own bindings.
    pub fn new(lua: &Lua) -> mlua::Result<Self> {
        let table = lua.create_table()?;
        let meta = lua.create_table()?;
        meta.raw_set("__index", lua.globals())?;
        table.set_metatable(Some(meta));
        table.raw_set("_G", table.clone())?;
        Ok(Self { table })
    }

    /// The underlying table, used as `_ENV` for compiled chunks.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Look a name up, falling back to the globals when it is not bound here.
    pub fn get(&self, name: &str) -> mlua::Result<Value> {
        self.lookup(name, DEFAULT_MAX_DEPTH)
    }

    /// Like [`Environment::get`], with tables nested deeper than
    /// `max_depth` elided.
    pub fn lookup(&self, name: &str, max_depth: usize) -> mlua::Result<Value> {
        let value: LuaValue = self.table.get(name)?;
        Converter::new(max_depth).convert(&value)
    }

    /// Look a name up in this environment only.
    pub fn get_local(&self, name: &str) -> mlua::Result<Value> {
        let value: LuaValue = self.table.raw_get(name)?;
        Converter::new(DEFAULT_MAX_DEPTH).convert(&value)
    }

    /// Bind a name in this environment. Never touches the globals.
    pub fn set(&self, name: &str, value: impl IntoLua) -> mlua::Result<()> {
        self.table.raw_set(name, value)
    }

    /// Names bound locally, sorted, excluding the `_G` self-reference.
    pub fn bindings(&self) -> mlua::Result<Vec<String>> {
        let mut names = Vec::new();
        for pair in self.table.pairs::<LuaValue, LuaValue>() {
            let (key, _) = pair?;
            if let LuaValue::String(name) = key {
                let name: String = name.to_string_lossy().into();
                if name != "_G" {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("table", &self.table.to_pointer())
            .finish()
    }
}

/// Owns one environment per surface and remembers the most recently active
/// surface.
#[derive(Debug, Default)]
pub struct EnvironmentRegistry {
    environments: HashMap<SurfaceId, Environment>,
    active: Option<SurfaceId>,
}

impl EnvironmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the surface's environment, creating an empty one if needed,
    /// and mark the surface active.
    pub fn get_or_create(&mut self, lua: &Lua, surface: &SurfaceId) -> mlua::Result<Environment> {
        self.active = Some(surface.clone());
        if let Some(env) = self.environments.get(surface) {
            return Ok(env.clone());
        }
        tracing::debug!(surface = %surface, "creating environment");
        let env = Environment::new(lua)?;
        self.environments.insert(surface.clone(), env.clone());
        Ok(env)
    }

    pub fn get(&self, surface: &SurfaceId) -> Option<&Environment> {
        self.environments.get(surface)
    }

    /// Drop the surface's bindings. The next `get_or_create` starts fresh.
    pub fn reset(&mut self, surface: &SurfaceId) {
        if self.environments.remove(surface).is_some() {
            tracing::debug!(surface = %surface, "environment reset");
        }
    }

    /// Forget a destroyed surface entirely.
    pub fn forget(&mut self, surface: &SurfaceId) {
        self.reset(surface);
        self.deactivate(surface);
    }

    /// Stop tracking the surface as active without dropping its bindings.
    pub fn deactivate(&mut self, surface: &SurfaceId) {
        if self.active.as_ref() == Some(surface) {
            self.active = None;
        }
    }

    pub fn active(&self) -> Option<&SurfaceId> {
        self.active.as_ref()
    }

    pub fn contains(&self, surface: &SurfaceId) -> bool {
        self.environments.contains_key(surface)
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_through_is_live() {
        let lua = Lua::new();
        let env = Environment::new(&lua).unwrap();
        lua.globals().set("shared", 1).unwrap();
        assert_eq!(env.get("shared").unwrap(), Value::Integer(1));

        lua.globals().set("shared", 2).unwrap();
        assert_eq!(env.get("shared").unwrap(), Value::Integer(2));
        assert_eq!(env.get_local("shared").unwrap(), Value::Nil);
    }

    #[test]
    fn test_writes_stay_local() {
        let lua = Lua::new();
        let env = Environment::new(&lua).unwrap();
        env.set("x", 42).unwrap();
        assert_eq!(env.get("x").unwrap(), Value::Integer(42));
        let global: LuaValue = lua.globals().get("x").unwrap();
        assert!(global.is_nil());
    }

    #[test]
    fn test_local_shadows_global() {
        let lua = Lua::new();
        let env = Environment::new(&lua).unwrap();
        lua.globals().set("name", "global").unwrap();
        env.set("name", "local").unwrap();
        assert_eq!(env.get("name").unwrap(), Value::String("local".to_string()));
    }

    #[test]
    fn test_lookup_bounds_shared_nesting() {
        let lua = Lua::new();
        let env = Environment::new(&lua).unwrap();
        lua.load("t = {} for _ = 1, 40 do t = { t, t } end")
            .set_environment(env.table().clone())
            .exec()
            .unwrap();
        let value = env.lookup("t", 2).unwrap();
        assert_eq!(value.inspect(), "{\n  { {...}, {...} },\n  { {...}, {...} }\n}");
    }

    #[test]
    fn test_self_reference() {
        let lua = Lua::new();
        let env = Environment::new(&lua).unwrap();
        let g: Table = env.table().raw_get("_G").unwrap();
        assert_eq!(g.to_pointer(), env.table().to_pointer());
        assert!(env.bindings().unwrap().is_empty());
    }

    #[test]
    fn test_registry_reuses_environment() {
        let lua = Lua::new();
        let mut registry = EnvironmentRegistry::new();
        let surface = SurfaceId::from("a");
        let first = registry.get_or_create(&lua, &surface).unwrap();
        first.set("x", 1).unwrap();
        let second = registry.get_or_create(&lua, &surface).unwrap();
        assert_eq!(second.get("x").unwrap(), Value::Integer(1));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active(), Some(&surface));
    }

    #[test]
    fn test_registry_reset() {
        let lua = Lua::new();
        let mut registry = EnvironmentRegistry::new();
        let surface = SurfaceId::from("a");
        registry.get_or_create(&lua, &surface).unwrap().set("x", 1).unwrap();
        registry.reset(&surface);
        assert!(!registry.contains(&surface));
        let fresh = registry.get_or_create(&lua, &surface).unwrap();
        assert_eq!(fresh.get("x").unwrap(), Value::Nil);
    }

    #[test]
    fn test_registry_forget_clears_active() {
        let lua = Lua::new();
        let mut registry = EnvironmentRegistry::new();
        let surface = SurfaceId::from("a");
        registry.get_or_create(&lua, &surface).unwrap();
        registry.forget(&surface);
        assert!(registry.is_empty());
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn test_unknown_surface_is_noop() {
        let mut registry = EnvironmentRegistry::new();
        registry.reset(&SurfaceId::from("missing"));
        registry.forget(&SurfaceId::from("missing"));
        assert!(registry.is_empty());
    }
}
