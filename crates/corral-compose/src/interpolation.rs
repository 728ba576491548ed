//! `$VAR` / `${VAR}` interpolation over raw document values.

use std::collections::HashMap;

use serde_yaml::Value;

use crate::error::{ComposeError, Result};

fn is_name_start(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphabetic()
}

fn is_name_char(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphanumeric()
}

/// Reads a bare `$NAME` starting at `pos`. Returns the substitution and the
/// position of the last consumed byte.
fn parse_variable<F>(line: &str, pos: usize, lookup: &F) -> (String, usize)
where
    F: Fn(&str) -> String,
{
    let bytes = line.as_bytes();
    let mut end = pos;
    while end < bytes.len() && is_name_char(bytes[end]) {
        end += 1;
    }
    (lookup(&line[pos..end]), end - 1)
}

/// Reads `NAME}` after a `${`. Any byte outside the name alphabet, an empty
/// name or a missing `}` is a failure.
fn parse_variable_with_braces<F>(line: &str, pos: usize, lookup: &F) -> Option<(String, usize)>
where
    F: Fn(&str) -> String,
{
    let bytes = line.as_bytes();
    let mut end = pos;
    while end < bytes.len() {
        let c = bytes[end];
        if c == b'}' {
            if end == pos {
                return None;
            }
            return Some((lookup(&line[pos..end]), end));
        }
        if !is_name_char(c) {
            return None;
        }
        end += 1;
    }
    None
}

fn parse_expression<F>(line: &str, pos: usize, lookup: &F) -> Option<(String, usize)>
where
    F: Fn(&str) -> String,
{
    let c = *line.as_bytes().get(pos)?;
    match c {
        b'$' => Some(("$".to_string(), pos)),
        b'{' => parse_variable_with_braces(line, pos + 1, lookup),
        b'0'..=b'9' => {
            // A name may not start with a digit: swallow the token, substitute nothing.
            let (_, last) = parse_variable(line, pos, &|_: &str| String::new());
            Some((String::new(), last))
        }
        c if is_name_start(c) => Some(parse_variable(line, pos, lookup)),
        _ => None,
    }
}

/// Substitutes every variable token in `line`.
///
/// Returns the substituted line and `true`, or an empty string and `false`
/// when the line contains a malformed token.
pub fn parse_line<F>(line: &str, lookup: F) -> (String, bool)
where
    F: Fn(&str) -> String,
{
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut literal_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] == b'$' {
            out.push_str(&line[literal_start..pos]);
            match parse_expression(line, pos + 1, &lookup) {
                Some((replaced, last)) => {
                    out.push_str(&replaced);
                    pos = last + 1;
                    literal_start = pos;
                    continue;
                }
                None => return (String::new(), false),
            }
        }
        pos += 1;
    }
    out.push_str(&line[literal_start..]);

    (out, true)
}

fn variable(vars: &HashMap<String, String>, name: &str) -> String {
    match vars.get(name) {
        Some(value) => value.clone(),
        None => {
            log::warn!("The {} variable is not set. Substituting a blank string.", name);
            String::new()
        }
    }
}

/// Interpolates every string nested inside `value` in place.
///
/// `key` names the field being interpolated and only appears in the error.
pub fn interpolate(key: &str, value: &mut Value, vars: &HashMap<String, String>) -> Result<()> {
    match value {
        Value::String(s) => {
            let (replaced, ok) = parse_line(s, |name| variable(vars, name));
            if !ok {
                return Err(ComposeError::Interpolation {
                    key: key.to_string(),
                    value: s.clone(),
                });
            }
            *s = replaced;
        }
        Value::Sequence(items) => {
            for item in items.iter_mut() {
                interpolate(key, item, vars)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate(key, item, vars)?;
            }
        }
        Value::Tagged(tagged) => interpolate(key, &mut tagged.value, vars)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}
