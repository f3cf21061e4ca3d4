//! Rewriting of statement snippets so they surface their bindings.
//!
//! A snippet that does not compile as an expression is matched against a
//! handful of statement shapes. Declarations of locals get copied into the
//! environment (they would otherwise vanish with the chunk) and every shape
//! gets a trailing `return` of the names it binds. Anything not recognised is
//! returned unchanged, which still runs but shows no value.

use std::sync::LazyLock;

use regex::Regex;

static LOCAL_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*local\s+function\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(.*\bend\s*;?\s*$")
        .expect("local function pattern")
});

static LOCAL_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*local\s+([A-Za-z0-9_\s,]+?)\s*=[^=]").expect("local assignment pattern")
});

static LOCAL_DECLARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*local\s+([A-Za-z0-9_\s,]+?)\s*;?\s*$").expect("local declaration pattern")
});

static ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*([A-Za-z0-9_\s,]+?)\s*=[^=]").expect("assignment pattern")
});

const RESERVED: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// A statement shape the rewriter knows how to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// `local function name(...) ... end`
    LocalFunction(String),
    /// `local a, b = ...`
    LocalAssign(Vec<String>),
    /// `local a, b`
    LocalDeclare(Vec<String>),
    /// `a, b = ...`
    Assign(Vec<String>),
}

/// Classify a snippet, in priority order. `None` means it is left as is.
pub fn classify(source: &str) -> Option<Shape> {
    if let Some(caps) = LOCAL_FUNCTION.captures(source) {
        let name = &caps[1];
        if is_identifier(name) {
            return Some(Shape::LocalFunction(name.to_string()));
        }
    }
    if let Some(caps) = LOCAL_ASSIGN.captures(source) {
        if let Some(names) = identifier_list(&caps[1]) {
            return Some(Shape::LocalAssign(names));
        }
    }
    if let Some(caps) = LOCAL_DECLARE.captures(source) {
        if let Some(names) = identifier_list(&caps[1]) {
            return Some(Shape::LocalDeclare(names));
        }
    }
    if let Some(caps) = ASSIGN.captures(source) {
        if let Some(names) = identifier_list(&caps[1]) {
            return Some(Shape::Assign(names));
        }
    }
    None
}

/// Rewrite a snippet so its top-level bindings persist and are returned.
pub fn rewrite(source: &str) -> String {
    let Some(shape) = classify(source) else {
        return source.to_string();
    };

    let mut out = source.to_string();
    match shape {
        Shape::LocalFunction(name) => {
            out.push_str(&format!("\n_ENV.{name} = {name}\nreturn {name}"));
        }
        Shape::LocalAssign(names) | Shape::LocalDeclare(names) => {
            for name in &names {
                out.push_str(&format!("\n_ENV.{name} = {name}"));
            }
            out.push_str(&format!("\nreturn {}", names.join(", ")));
        }
        // Plain assignment already writes into the environment.
        Shape::Assign(names) => {
            out.push_str(&format!("\nreturn {}", names.join(", ")));
        }
    }
    out
}

/// Split a comma-separated name list, rejecting it if any entry is not a
/// plain identifier.
fn identifier_list(list: &str) -> Option<Vec<String>> {
    let names: Vec<String> = list.split(',').map(|name| name.trim().to_string()).collect();
    if names.iter().all(|name| is_identifier(name)) {
        Some(names)
    } else {
        None
    }
}

/// ASCII Lua identifier that is not a reserved word.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED.contains(&name)
}
