//! Lenient deserializers for the many shapes compose fields come in.
//!
//! Compose lets most list fields be written as a single string, most maps as
//! a `key=value` list, and numbers as quoted strings. Each helper here reads
//! a [`Value`] and normalizes it to one canonical Rust shape.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

/// Renders a scalar as a string. Returns `None` for sequences and maps.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn expect_scalar<E: serde::de::Error>(value: &Value) -> Result<String, E> {
    scalar_to_string(value).ok_or_else(|| E::custom(format!("expected a scalar, got {value:?}")))
}

/// Splits a command line into words, honouring single and double quotes.
pub fn split_command(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_word = true;
                }
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// `Option<String>` from any scalar.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(v) => expect_scalar(&v).map(Some),
    }
}

/// `String` from any scalar; null becomes empty.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    expect_scalar(&value)
}

/// A single string or a list of scalars.
pub fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items.iter().map(expect_scalar).collect(),
        other => Ok(vec![expect_scalar(&other)?]),
    }
}

/// A command: a list of words, or a string split like a shell would.
pub fn command<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items.iter().map(expect_scalar).collect(),
        other => Ok(split_command(&expect_scalar::<D::Error>(&other)?)),
    }
}

/// A `KEY=VALUE` list, or a map rendered into one (`KEY` alone for null
/// values).
pub fn map_or_equal_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    map_or_joined_list(Value::deserialize(deserializer)?, "=")
}

/// A `key:value` list, or a map rendered into one.
pub fn map_or_colon_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    map_or_joined_list(Value::deserialize(deserializer)?, ":")
}

fn map_or_joined_list<E: serde::de::Error>(value: Value, sep: &str) -> Result<Vec<String>, E> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items.iter().map(expect_scalar).collect(),
        Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| {
                let key = expect_scalar::<E>(k)?;
                Ok(match v {
                    Value::Null => key,
                    v => format!("{key}{sep}{}", expect_scalar::<E>(v)?),
                })
            })
            .collect(),
        other => Err(E::custom(format!("expected a list or a map, got {other:?}"))),
    }
}

/// A map, or a `key=value` list parsed into one (`key` alone maps to "").
pub fn list_or_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(IndexMap::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                let entry = expect_scalar::<D::Error>(item)?;
                Ok(match entry.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (entry, String::new()),
                })
            })
            .collect(),
        Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| Ok((expect_scalar::<D::Error>(k)?, expect_scalar::<D::Error>(v)?)))
            .collect(),
        other => Err(D::Error::custom(format!("expected a list or a map, got {other:?}"))),
    }
}

fn parse_int<E: serde::de::Error>(value: &Value) -> Result<i64, E> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| E::custom(format!("invalid integer {n}"))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| E::custom(format!("invalid integer \"{s}\""))),
        other => Err(E::custom(format!("expected an integer, got {other:?}"))),
    }
}

/// An integer written as a number or a numeric string.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    parse_int(&Value::deserialize(deserializer)?)
}

/// Parses a memory size like `512`, `64k`, `128m` or `1g` into bytes.
pub fn parse_mem_size(input: &str) -> Option<i64> {
    let s = input.trim().to_ascii_lowercase();
    let s = s.strip_suffix('b').filter(|rest| !rest.is_empty()).unwrap_or(s.as_str());
    let (digits, multiplier) = match s.chars().last()? {
        'k' => (&s[..s.len() - 1], 1024),
        'm' => (&s[..s.len() - 1], 1024 * 1024),
        'g' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    digits.trim().parse::<i64>().ok().map(|n| n * multiplier)
}

/// A byte count given as a number or a size string with a unit suffix.
pub fn mem_size<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => {
            parse_mem_size(&s).ok_or_else(|| D::Error::custom(format!("invalid size \"{s}\"")))
        }
        other => parse_int(&other),
    }
}

/// A boolean written as a bool or a `true`/`false` string.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("invalid boolean \"{s}\""))),
        },
        other => Err(D::Error::custom(format!("expected a boolean, got {other:?}"))),
    }
}

pub(crate) fn is_zero(n: &i64) -> bool {
    *n == 0
}

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}
