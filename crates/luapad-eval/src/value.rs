//! Snapshots of Lua values and their structural representation.
//!
//! Results are copied out of the Lua state as soon as a snippet returns so
//! rendering never touches the interpreter. Tables are copied recursively,
//! with back-references for cycles and a cut-off for deep nesting.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fmt::Write as _;

use mlua::Value as LuaValue;

use crate::transform::is_identifier;

/// A value returned by a snippet.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    /// A table, with entries in display order (sequence part first).
    Table { id: usize, entries: Vec<(Value, Value)> },
    /// A reference back to an enclosing table.
    Recursive(usize),
    /// A table nested deeper than the configured depth.
    Elided,
    Function(usize),
    /// Userdata, threads and other handles only shown by kind.
    Opaque { kind: String, id: usize },
}

impl Value {
    /// Check if this value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Render the value the way it is shown in result annotations.
    ///
    /// The output may span several lines for keyed or nested tables.
    pub fn inspect(&self) -> String {
        let mut targets = HashSet::new();
        self.collect_recursive(&mut targets);
        let mut out = String::new();
        self.write_inspect(&mut out, 0, &targets);
        out
    }

    fn collect_recursive(&self, targets: &mut HashSet<usize>) {
        match self {
            Value::Recursive(id) => {
                targets.insert(*id);
            }
            Value::Table { entries, .. } => {
                for (key, value) in entries {
                    key.collect_recursive(targets);
                    value.collect_recursive(targets);
                }
            }
            _ => {}
        }
    }

    fn write_inspect(&self, out: &mut String, indent: usize, targets: &HashSet<usize>) {
        match self {
            Value::Nil => out.push_str("nil"),
            Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Integer(i) => {
                let _ = write!(out, "{}", i);
            }
            Value::Number(n) => out.push_str(&format_number(*n)),
            Value::String(s) => write_quoted(out, s),
            Value::Recursive(id) => {
                let _ = write!(out, "<table {}>", id);
            }
            Value::Elided => out.push_str("{...}"),
            Value::Function(id) => {
                let _ = write!(out, "<function {}>", id);
            }
            Value::Opaque { kind, id } => {
                let _ = write!(out, "<{} {}>", kind, id);
            }
            Value::Table { id, entries } => {
                if targets.contains(id) {
                    let _ = write!(out, "<{}>", id);
                }
                write_table(out, entries, indent, targets);
            }
        }
    }
}

fn write_table(
    out: &mut String,
    entries: &[(Value, Value)],
    indent: usize,
    targets: &HashSet<usize>,
) {
    if entries.is_empty() {
        out.push_str("{}");
        return;
    }

    let sequence_len = sequence_prefix_len(entries);
    let inline = sequence_len == entries.len()
        && entries
            .iter()
            .all(|(_, value)| !matches!(value, Value::Table { entries, .. } if !entries.is_empty()));

    if inline {
        out.push_str("{ ");
        for (i, (_, value)) in entries.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            value.write_inspect(out, indent, targets);
        }
        out.push_str(" }");
        return;
    }

    let pad = "  ".repeat(indent + 1);
    out.push_str("{\n");
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            out.push_str(",\n");
        }
        out.push_str(&pad);
        if i >= sequence_len {
            match key {
                Value::String(name) if is_identifier(name) => out.push_str(name),
                other => {
                    out.push('[');
                    other.write_inspect(out, indent + 1, targets);
                    out.push(']');
                }
            }
            out.push_str(" = ");
        }
        value.write_inspect(out, indent + 1, targets);
    }
    out.push('\n');
    out.push_str(&"  ".repeat(indent));
    out.push('}');
}

/// Number of leading entries keyed 1, 2, 3, ...
fn sequence_prefix_len(entries: &[(Value, Value)]) -> usize {
    entries
        .iter()
        .enumerate()
        .take_while(|(i, (key, _))| matches!(key, Value::Integer(k) if *k == *i as i64 + 1))
        .count()
}

/// Lua 5.4 float formatting: `%.14g`, plus `.0` when the result would
/// otherwise read as an integer.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut out = format_general(n, 14);
    if !out.contains(['.', 'e']) {
        out.push_str(".0");
    }
    out
}

/// C's `%.<precision>g`.
fn format_general(n: f64, precision: usize) -> String {
    let scientific = format!("{:.*e}", precision - 1, n);
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (precision as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

fn write_quoted(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\{}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}

/// Copies Lua values into [`Value`] snapshots.
///
/// Ids are handed out per kind in encounter order, so two conversions of
/// equal data produce equal snapshots. One converter should be used for all
/// values returned by a single evaluation so shared tables get the same id.
pub(crate) struct Converter {
    max_depth: usize,
    ids: HashMap<(&'static str, usize), usize>,
    counters: HashMap<&'static str, usize>,
    open: Vec<usize>,
}

impl Converter {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            ids: HashMap::new(),
            counters: HashMap::new(),
            open: Vec::new(),
        }
    }

    pub(crate) fn convert(&mut self, value: &LuaValue) -> mlua::Result<Value> {
        self.convert_at(value, 0)
    }

    fn convert_at(&mut self, value: &LuaValue, depth: usize) -> mlua::Result<Value> {
        Ok(match value {
            LuaValue::Nil => Value::Nil,
            LuaValue::Boolean(b) => Value::Boolean(*b),
            LuaValue::Integer(i) => Value::Integer(*i),
            LuaValue::Number(n) => Value::Number(*n),
            LuaValue::String(s) => Value::String(s.to_string_lossy().into()),
            LuaValue::Table(table) => self.convert_table(table, depth)?,
            LuaValue::Function(_) => Value::Function(self.id_for("function", value.to_pointer() as usize)),
            other => {
                let kind = other.type_name();
                Value::Opaque {
                    kind: kind.to_string(),
                    id: self.id_for(kind, other.to_pointer() as usize),
                }
            }
        })
    }

    fn convert_table(&mut self, table: &mlua::Table, depth: usize) -> mlua::Result<Value> {
        let ptr = table.to_pointer() as usize;
        if self.open.contains(&ptr) {
            return Ok(Value::Recursive(self.id_for("table", ptr)));
        }
        if depth >= self.max_depth {
            return Ok(Value::Elided);
        }

        let id = self.id_for("table", ptr);
        self.open.push(ptr);
        let mut entries = Vec::new();
        for pair in table.pairs::<LuaValue, LuaValue>() {
            let (key, value) = pair?;
            let key = self.convert_at(&key, depth + 1)?;
            let value = self.convert_at(&value, depth + 1)?;
            entries.push((key, value));
        }
        self.open.pop();

        let len = table.raw_len() as i64;
        entries.sort_by(|(a, _), (b, _)| compare_keys(a, b, len));
        Ok(Value::Table { id, entries })
    }

    fn id_for(&mut self, kind: &'static str, ptr: usize) -> usize {
        if let Some(id) = self.ids.get(&(kind, ptr)) {
            return *id;
        }
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        self.ids.insert((kind, ptr), *counter);
        *counter
    }
}

/// Display order for table keys: the `1..=len` sequence, then booleans,
/// numbers, strings, and everything else.
fn compare_keys(a: &Value, b: &Value, len: i64) -> Ordering {
    key_rank(a, len)
        .cmp(&key_rank(b, len))
        .then_with(|| match (a, b) {
            (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => match (as_f64(a), as_f64(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => opaque_id(a).cmp(&opaque_id(b)),
            },
        })
}

fn key_rank(key: &Value, len: i64) -> u8 {
    match key {
        Value::Integer(i) if (1..=len).contains(i) => 0,
        Value::Boolean(_) => 1,
        Value::Integer(_) | Value::Number(_) => 2,
        Value::String(_) => 3,
        _ => 4,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(n) => Some(*n),
        _ => None,
    }
}

fn opaque_id(value: &Value) -> usize {
    match value {
        Value::Table { id, .. } | Value::Recursive(id) | Value::Function(id) => *id,
        Value::Opaque { id, .. } => *id,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    fn snapshot(lua: &Lua, code: &str) -> Value {
        let value: LuaValue = lua.load(code).eval().unwrap();
        Converter::new(8).convert(&value).unwrap()
    }

    fn int(i: i64) -> Value {
        Value::Integer(i)
    }

    fn key(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_scalars() {
        assert_eq!(Value::Nil.inspect(), "nil");
        assert_eq!(Value::Boolean(true).inspect(), "true");
        assert_eq!(int(42).inspect(), "42");
        assert_eq!(Value::Number(1.5).inspect(), "1.5");
        assert_eq!(Value::Number(2.0).inspect(), "2.0");
        assert_eq!(Value::Number(f64::INFINITY).inspect(), "inf");
        assert_eq!(Value::Number(f64::NEG_INFINITY).inspect(), "-inf");
    }

    #[test]
    fn test_is_nil() {
        assert!(Value::Nil.is_nil());
        assert!(!Value::Boolean(false).is_nil());
    }

    #[test]
    fn test_float_formatting_matches_lua() {
        assert_eq!(Value::Number(0.1 + 0.2).inspect(), "0.3");
        assert_eq!(Value::Number(1e100).inspect(), "1e+100");
        assert_eq!(Value::Number(1e16).inspect(), "1e+16");
        assert_eq!(Value::Number(1e-5).inspect(), "1e-05");
        assert_eq!(Value::Number(0.0001).inspect(), "0.0001");
        assert_eq!(Value::Number(-0.0).inspect(), "-0.0");
        assert_eq!(Value::Number(100.0).inspect(), "100.0");
        assert_eq!(Value::Number(1.0 / 3.0).inspect(), "0.33333333333333");
    }

    #[test]
    fn test_string_escapes() {
        let value = Value::String("say \"hi\"\n\tbye\\".to_string());
        assert_eq!(value.inspect(), r#""say \"hi\"\n\tbye\\""#);
    }

    #[test]
    fn test_empty_table() {
        let value = Value::Table { id: 1, entries: vec![] };
        assert_eq!(value.inspect(), "{}");
    }

    #[test]
    fn test_sequence_is_inline() {
        let value = Value::Table {
            id: 1,
            entries: vec![(int(1), int(10)), (int(2), key("x"))],
        };
        assert_eq!(value.inspect(), r#"{ 10, "x" }"#);
    }

    #[test]
    fn test_keyed_table_is_multiline() {
        let inner = Value::Table {
            id: 2,
            entries: vec![(int(1), int(1)), (int(2), int(2))],
        };
        let value = Value::Table {
            id: 1,
            entries: vec![(key("a"), int(1)), (key("b"), inner), (key("two words"), Value::Boolean(false))],
        };
        assert_eq!(
            value.inspect(),
            "{\n  a = 1,\n  b = { 1, 2 },\n  [\"two words\"] = false\n}"
        );
    }

    #[test]
    fn test_nested_keyed_tables_indent() {
        let inner = Value::Table { id: 2, entries: vec![(key("y"), int(2))] };
        let value = Value::Table { id: 1, entries: vec![(key("x"), inner)] };
        assert_eq!(value.inspect(), "{\n  x = {\n    y = 2\n  }\n}");
    }

    #[test]
    fn test_cycle_is_marked() {
        let value = Value::Table {
            id: 1,
            entries: vec![(key("self"), Value::Recursive(1))],
        };
        assert_eq!(value.inspect(), "<1>{\n  self = <table 1>\n}");
    }

    #[test]
    fn test_convert_sorts_keys() {
        let lua = Lua::new();
        let value = snapshot(&lua, r#"{ "a", "b", z = 1, m = 2, [true] = 3, [10] = 4 }"#);
        assert_eq!(
            value.inspect(),
            "{\n  \"a\",\n  \"b\",\n  [true] = 3,\n  [10] = 4,\n  m = 2,\n  z = 1\n}"
        );
    }

    #[test]
    fn test_convert_cycle() {
        let lua = Lua::new();
        let value = snapshot(&lua, "local t = {} t.me = t return t");
        assert_eq!(
            value,
            Value::Table { id: 1, entries: vec![(key("me"), Value::Recursive(1))] }
        );
    }

    #[test]
    fn test_convert_depth_limit() {
        let lua = Lua::new();
        let value: LuaValue = lua.load("{ { { 1 } } }").eval().unwrap();
        let value = Converter::new(2).convert(&value).unwrap();
        assert_eq!(value.inspect(), "{\n  { {...} }\n}");
    }

    #[test]
    fn test_convert_functions_share_ids() {
        let lua = Lua::new();
        let value = snapshot(&lua, "local f = function() end return { f, f, print }");
        assert_eq!(value.inspect(), "{ <function 1>, <function 1>, <function 2> }");
    }

    #[test]
    fn test_convert_integer_and_float() {
        let lua = Lua::new();
        assert_eq!(snapshot(&lua, "3"), int(3));
        assert_eq!(snapshot(&lua, "3 / 2"), Value::Number(1.5));
    }
}
