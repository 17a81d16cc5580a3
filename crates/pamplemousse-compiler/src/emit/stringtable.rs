//! String-literal escaping and `StringTable` rendering (§4.8, C9).
//!
//! A [`pamplemousse_core::Literal::StringTable`] compiles to a
//! key-to-`true` table literal evaluated once at the call site, so a
//! set-membership predicate over a large category list costs one
//! table construction and one `pmml_table_is_in` lookup rather than a
//! chain of string comparisons.

/// Escapes a Rust string for use inside a double-quoted Lua string
/// literal.
pub fn escape_lua_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

pub fn quote(s: &str) -> String {
    format!("\"{}\"", escape_lua_string(s))
}

pub fn render_string_table(values: &[String]) -> String {
    let entries: Vec<String> = values.iter().map(|v| format!("[{}] = true", quote(v))).collect();
    format!("{{{}}}", entries.join(", "))
}
