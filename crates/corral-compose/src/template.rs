//! Template expansion applied to compose documents before YAML parsing.
//!
//! Documents are rendered with Handlebars against a context exposing
//! `Values`, `Release`/`Stack` and `Cluster`. Catalog templates are usually
//! written with Go-style actions (`{{ .Values.foo }}`, `{{ if ... }}` ...
//! `{{ end }}`), so those are translated to Handlebars syntax first.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use handlebars::{Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, ScopedJson};
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;

use crate::error::{ComposeError, Result};

static ACTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(-?)\s*(.*?)\s*(-?)\}\}").unwrap());

/// Release metadata exposed as `.Release` and `.Stack`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseInfo {
    pub name: String,
    pub version: String,
    pub previous_version: String,
}

/// Cluster metadata exposed as `.Cluster`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterInfo {
    pub embedded: String,
    pub orchestration: String,
}

/// Everything a template can reference besides `.Values`.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub release: ReleaseInfo,
    pub cluster: ClusterInfo,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RenderData<'a> {
    values: &'a HashMap<String, String>,
    release: &'a ReleaseInfo,
    stack: &'a ReleaseInfo,
    cluster: &'a ClusterInfo,
}

/// Returns true when the document opts out of templating.
pub fn skips_templating(contents: &str) -> bool {
    let trimmed = contents.trim();
    trimmed.starts_with("#notemplating") || trimmed.starts_with("# notemplating")
}

/// Expands `contents` with the given variables and release/cluster metadata.
pub fn apply(
    contents: &str,
    ctx: &TemplateContext,
    values: &HashMap<String, String>,
) -> Result<String> {
    if skips_templating(contents) || !contents.contains("{{") {
        return Ok(contents.to_string());
    }

    let source = translate(contents)?;

    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    for (name, func) in FUNCTIONS {
        registry.register_helper(name, Box::new(Function(*func)));
    }

    let data = RenderData {
        values,
        release: &ctx.release,
        stack: &ctx.release,
        cluster: &ctx.cluster,
    };

    registry
        .render_template(&source, &data)
        .map_err(|e| ComposeError::Template(e.to_string()))
}

type Func = fn(&[&Value]) -> Value;

/// Template functions usable both as `{{f a b}}` and as `(f a b)`.
struct Function(Func);

impl HelperDef for Function {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> std::result::Result<ScopedJson<'reg, 'rc>, RenderError> {
        let params: Vec<&Value> = h.params().iter().map(|p| p.value()).collect();
        Ok(ScopedJson::Derived((self.0)(&params)))
    }
}

const FUNCTIONS: &[(&str, Func)] = &[
    ("eq", eq),
    ("ne", ne),
    ("lt", |args| compare(args, |o| o.is_lt())),
    ("le", |args| compare(args, |o| o.is_le())),
    ("gt", |args| compare(args, |o| o.is_gt())),
    ("ge", |args| compare(args, |o| o.is_ge())),
    ("and", and),
    ("or", or),
    ("not", |args| Value::Bool(!args.first().is_some_and(|v| truthy(v)))),
    ("empty", |args| Value::Bool(!args.first().is_some_and(|v| truthy(v)))),
    ("default", default),
    ("quote", |args| quote(args, '"')),
    ("squote", |args| quote(args, '\'')),
    ("upper", |args| Value::String(text(arg(args, 0)).to_uppercase())),
    ("lower", |args| Value::String(text(arg(args, 0)).to_lowercase())),
    ("trim", |args| Value::String(text(arg(args, 0)).trim().to_string())),
    ("contains", |args| Value::Bool(text(arg(args, 1)).contains(&text(arg(args, 0))))),
    ("hasPrefix", |args| Value::Bool(text(arg(args, 1)).starts_with(&text(arg(args, 0))))),
    ("hasSuffix", |args| Value::Bool(text(arg(args, 1)).ends_with(&text(arg(args, 0))))),
    ("replace", |args| {
        Value::String(text(arg(args, 2)).replace(&text(arg(args, 0)), &text(arg(args, 1))))
    }),
    ("join", join),
    ("splitPreserveQuotes", |args| {
        Value::Array(
            split_preserve_quotes(&text(arg(args, 0)))
                .into_iter()
                .map(Value::String)
                .collect(),
        )
    }),
];

fn arg<'a>(args: &[&'a Value], index: usize) -> &'a Value {
    args.get(index).copied().unwrap_or(&Value::Null)
}

fn text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Go template truth: false, zero, nil and empty values are false.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Values are compared by their text, so `eq .Values.port 8080` matches the
/// string "8080".
fn eq(args: &[&Value]) -> Value {
    let first = text(arg(args, 0));
    Value::Bool(args.iter().skip(1).any(|v| text(v) == first))
}

fn ne(args: &[&Value]) -> Value {
    Value::Bool(text(arg(args, 0)) != text(arg(args, 1)))
}

fn compare(args: &[&Value], check: fn(Ordering) -> bool) -> Value {
    let (a, b) = (text(arg(args, 0)), text(arg(args, 1)));
    let ordering = match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y),
        _ => Some(a.cmp(&b)),
    };
    Value::Bool(ordering.is_some_and(check))
}

/// First false argument, otherwise the last one.
fn and(args: &[&Value]) -> Value {
    args.iter()
        .find(|v| !truthy(v))
        .or(args.last())
        .map(|v| (*v).clone())
        .unwrap_or(Value::Null)
}

/// First true argument, otherwise the last one.
fn or(args: &[&Value]) -> Value {
    args.iter()
        .find(|v| truthy(v))
        .or(args.last())
        .map(|v| (*v).clone())
        .unwrap_or(Value::Null)
}

/// `default "fallback" .Values.x` is the value unless it is empty.
fn default(args: &[&Value]) -> Value {
    let value = arg(args, 1);
    if truthy(value) {
        value.clone()
    } else {
        arg(args, 0).clone()
    }
}

fn quote(args: &[&Value], mark: char) -> Value {
    let quoted: Vec<String> = args
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| match mark {
            '"' => serde_json::to_string(&text(v)).unwrap_or_default(),
            _ => format!("{mark}{}{mark}", text(v)),
        })
        .collect();
    Value::String(quoted.join(" "))
}

fn join(args: &[&Value]) -> Value {
    let separator = text(arg(args, 0));
    let joined = match arg(args, 1) {
        Value::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(&separator),
        other => text(other),
    };
    Value::String(joined)
}

/// Splits on whitespace outside single or double quotes. Quotes are kept.
pub fn split_preserve_quotes(s: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    fields.push(std::mem::take(&mut current));
                }
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}

#[derive(Debug, Clone, Copy)]
enum Block {
    If,
    Each,
    With,
}

impl Block {
    fn close(self) -> &'static str {
        match self {
            Block::If => "/if",
            Block::Each => "/each",
            Block::With => "/with",
        }
    }
}

/// Translates Go-style template actions into Handlebars.
///
/// Handlebars has no `else if`, so each one opens an `#if` nested in the
/// `else` branch and the matching `end` closes all of them.
pub fn translate(source: &str) -> Result<String> {
    // open blocks with the number of `else if` branches chained onto each
    let mut stack: Vec<(Block, usize)> = Vec::new();
    let mut error: Option<ComposeError> = None;

    let translated = ACTION_PATTERN.replace_all(source, |caps: &Captures| {
        if error.is_some() {
            return String::new();
        }
        let open = if caps[1].is_empty() { "{{" } else { "{{~" };
        let close = if caps[3].is_empty() { "}}" } else { "~}}" };
        let body = caps[2].trim();

        let inner = if body.starts_with("/*") {
            return String::new();
        } else if body == "end" {
            match stack.pop() {
                Some((block, chained)) => {
                    let mut closing = block.close().to_string();
                    for _ in 0..chained {
                        closing.push_str(&format!("{close}{open}/if"));
                    }
                    Ok(closing)
                }
                None => Err(ComposeError::Template("unexpected {{end}}".to_string())),
            }
        } else if body == "else" {
            Ok("else".to_string())
        } else if let Some(rest) = body.strip_prefix("else if ") {
            match stack.last_mut() {
                Some((_, chained)) => {
                    *chained += 1;
                    pipeline(rest).map(|t| format!("else{close}{open}#if {}", t.operand()))
                }
                None => Err(ComposeError::Template("unexpected {{else if}}".to_string())),
            }
        } else if let Some(rest) = body.strip_prefix("if ") {
            stack.push((Block::If, 0));
            pipeline(rest).map(|t| format!("#if {}", t.operand()))
        } else if let Some(rest) = body.strip_prefix("range ") {
            stack.push((Block::Each, 0));
            pipeline(rest).map(|t| format!("#each {}", t.operand()))
        } else if let Some(rest) = body.strip_prefix("with ") {
            stack.push((Block::With, 0));
            pipeline(rest).map(|t| format!("#with {}", t.operand()))
        } else {
            pipeline(body).map(Term::inline)
        };

        match inner {
            Ok(inner) => format!("{open}{inner}{close}"),
            Err(e) => {
                error = Some(e);
                String::new()
            }
        }
    });

    if let Some(e) = error {
        return Err(e);
    }
    if let Some((block, _)) = stack.last() {
        return Err(ComposeError::Template(format!(
            "unclosed block, expected {{{{{}}}}}",
            block.close()
        )));
    }
    Ok(translated.into_owned())
}

/// A translated pipeline: a plain value or a function call.
enum Term {
    Value(String),
    Call(Vec<String>),
}

impl Term {
    /// Form used as an argument or block condition.
    fn operand(self) -> String {
        match self {
            Term::Value(v) => v,
            Term::Call(args) => format!("({})", args.join(" ")),
        }
    }

    /// Form used directly inside `{{ }}`.
    fn inline(self) -> String {
        match self {
            Term::Value(v) => v,
            Term::Call(args) => args.join(" "),
        }
    }
}

/// `a | f b | g` becomes `g (f b a)`: each stage receives the previous
/// result as its last argument.
fn pipeline(expr: &str) -> Result<Term> {
    let tokens = tokenize(expr)?;
    let mut term: Option<Term> = None;
    for stage in tokens.split(|t| t == "|") {
        let Some(head) = stage.first() else {
            return Err(ComposeError::Template(format!("empty command in {{{{{expr}}}}}")));
        };
        let mut args = stage
            .iter()
            .map(|t| operand(t))
            .collect::<Result<Vec<_>>>()?;
        term = Some(match term.take() {
            Some(previous) if is_function(head) => {
                args.push(previous.operand());
                Term::Call(args)
            }
            Some(_) => {
                return Err(ComposeError::Template(format!(
                    "cannot pipe into {head} in {{{{{expr}}}}}"
                )))
            }
            None if args.len() == 1 && !is_function(head) => Term::Value(args.remove(0)),
            None => Term::Call(args),
        });
    }
    term.ok_or_else(|| ComposeError::Template("empty action {{}}".to_string()))
}

fn operand(token: &str) -> Result<String> {
    if let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        return Ok(pipeline(inner)?.operand());
    }
    if token.starts_with('"') {
        return Ok(token.to_string());
    }
    if token == "nil" {
        return Ok("null".to_string());
    }
    Ok(translate_token(token))
}

fn translate_token(token: &str) -> String {
    if token == "." {
        "this".to_string()
    } else if token == "$" {
        "@root".to_string()
    } else if let Some(rest) = token.strip_prefix("$.") {
        format!("@root.{rest}")
    } else if let Some(rest) = token.strip_prefix('.') {
        rest.to_string()
    } else {
        token.to_string()
    }
}

fn is_function(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_alphabetic())
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(token, "true" | "false" | "nil")
}

/// Splits an action into words, quoted strings, parenthesized groups and
/// `|` separators. Raw backquoted strings become double-quoted ones.
fn tokenize(expr: &str) -> Result<Vec<String>> {
    let unbalanced = || {
        ComposeError::Template(format!("unbalanced quotes or parentheses in {{{{{expr}}}}}"))
    };
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '|' {
            tokens.push("|".to_string());
            i += 1;
        } else if c == '`' {
            let end = chars[i + 1..]
                .iter()
                .position(|&c| c == '`')
                .ok_or_else(unbalanced)?;
            let raw: String = chars[i + 1..i + 1 + end].iter().collect();
            tokens.push(serde_json::to_string(&raw).unwrap_or_default());
            i += end + 2;
        } else if c == '"' || c == '(' {
            let end = group_end(&chars, i).ok_or_else(unbalanced)?;
            tokens.push(chars[i..=end].iter().collect());
            i = end + 1;
        } else if c == ')' {
            return Err(unbalanced());
        } else {
            let start = i;
            while i < chars.len()
                && !chars[i].is_whitespace()
                && !matches!(chars[i], '|' | '(' | ')')
            {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        }
    }
    Ok(tokens)
}

/// Index of the character closing the string or group opened at `start`.
fn group_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            match c {
                '\\' => i += 1,
                '"' => {
                    in_string = false;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        } else {
            match c {
                '"' => in_string = true,
                '(' => depth += 1,
                ')' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}
