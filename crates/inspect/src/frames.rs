//! Stack-frame extraction from opaque captured traces.
//!
//! Trace text is an engine detail and its format drifts, so parsing
//! sits behind a small trait: produce ordered frames (innermost first)
//! from an opaque capture. The heuristics can be swapped or hardened
//! without touching the provenance algorithm that consumes them.

use host::stack::Trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub name: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl StackFrame {
    /// Frames are matched by call site, not by name: names repeat,
    /// source positions do not.
    pub fn same_source(&self, other: &StackFrame) -> bool {
        self.line == other.line && self.column == other.column && self.file == other.file
    }
}

/// Produces ordered frames, innermost first, from an opaque trace.
pub trait StackFrameSource {
    fn frames(&self, trace: &Trace) -> Vec<StackFrame>;
}

/// Parser for the engine's `at name (file:line:col)` text format.
/// Malformed lines are skipped, never fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineFormat;

impl StackFrameSource for EngineFormat {
    fn frames(&self, trace: &Trace) -> Vec<StackFrame> {
        trace.0.lines().filter_map(parse_line).collect()
    }
}

fn parse_line(line: &str) -> Option<StackFrame> {
    let rest = line.trim_start().strip_prefix("at ")?;
    let open = rest.rfind('(')?;
    let name = rest[..open].trim();
    if name.is_empty() {
        return None;
    }
    let location = rest[open + 1..].strip_suffix(')')?;
    let mut parts = location.rsplitn(3, ':');
    let column = parts.next()?.parse().ok()?;
    let line_no = parts.next()?.parse().ok()?;
    let file = parts.next()?;
    if file.is_empty() {
        return None;
    }
    Some(StackFrame {
        name: name.to_string(),
        file: file.to_string(),
        line: line_no,
        column,
    })
}

fn base_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

fn strip_accessor_prefix(base: &str) -> Option<&str> {
    if let Some(rest) = base.strip_prefix("use_") {
        if !rest.is_empty() {
            return Some(rest);
        }
    }
    let rest = base.strip_prefix("use")?;
    if rest.chars().next().is_some_and(char::is_uppercase) {
        return Some(rest);
    }
    None
}

/// Does the name follow the primitive-call naming convention
/// (`use_thing` or `useThing`)?
pub fn is_hook_named(name: &str) -> bool {
    strip_accessor_prefix(base_name(name)).is_some()
}

fn pascal_case(name: &str) -> String {
    if !name.contains('_') {
        let mut chars = name.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    name.split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Display name for a user hook: `use_custom_a` and `useCustomA` both
/// normalize to `CustomA`. Names without the accessor prefix keep
/// their shape, title-cased.
pub fn normalize_hook_name(name: &str) -> String {
    let base = base_name(name);
    match strip_accessor_prefix(base) {
        Some(stripped) => pascal_case(stripped),
        None => pascal_case(base),
    }
}
