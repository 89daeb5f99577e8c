//! Raw probe results.
//!
//! The external prober reports one raw value per fact name. This module
//! holds that mapping and the encodings it can be read from:
//!
//! - TOML: `[probes]` table, optional `[target]` table and `not_probed` list
//! - JSON: same shape as TOML, `null` meaning "not probed"
//! - Text records: one `NAME=value` per line
//! - Header replay: a previously generated `#define` / `/* #undef */` header

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::core::target::{TargetDescriptor, TargetError, TargetSpec};

/// Errors reading probe results.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read probe results `{path}`")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML probe results: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON probe results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: `{name}` is reported more than once")]
    Duplicate { name: String, line: usize },

    #[error("invalid [target] table: {0}")]
    Target(#[from] TargetError),
}

/// One raw probe outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Str(String),
    NotProbed,
}

impl RawValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Bool(_) => "boolean",
            RawValue::Int(_) => "integer",
            RawValue::Str(_) => "string",
            RawValue::NotProbed => "not probed",
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Int(i) => write!(f, "{}", i),
            RawValue::Str(s) => write!(f, "{:?}", s),
            RawValue::NotProbed => write!(f, "?"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRepr {
    Bool(bool),
    Int(i64),
    Str(String),
    Null(()),
}

impl From<RawRepr> for RawValue {
    fn from(repr: RawRepr) -> Self {
        match repr {
            RawRepr::Bool(b) => RawValue::Bool(b),
            RawRepr::Int(i) => RawValue::Int(i),
            RawRepr::Str(s) => RawValue::Str(s),
            RawRepr::Null(()) => RawValue::NotProbed,
        }
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        RawRepr::deserialize(deserializer).map(RawValue::from)
    }
}

impl Serialize for RawValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawValue::Bool(b) => serializer.serialize_bool(*b),
            RawValue::Int(i) => serializer.serialize_i64(*i),
            RawValue::Str(s) => serializer.serialize_str(s),
            RawValue::NotProbed => serializer.serialize_none(),
        }
    }
}

/// Raw probe results keyed by fact name.
///
/// Backed by a `BTreeMap` so iteration order never depends on insertion
/// order or hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbeResults {
    values: BTreeMap<String, RawValue>,
}

impl ProbeResults {
    pub fn new() -> Self {
        ProbeResults::default()
    }

    /// Record a value, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: RawValue) -> Option<RawValue> {
        self.values.insert(name.into(), value)
    }

    pub fn set_bool(&mut self, name: impl Into<String>, value: bool) -> &mut Self {
        self.insert(name, RawValue::Bool(value));
        self
    }

    pub fn set_int(&mut self, name: impl Into<String>, value: i64) -> &mut Self {
        self.insert(name, RawValue::Int(value));
        self
    }

    pub fn set_str(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.insert(name, RawValue::Str(value.into()));
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<RawValue> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, RawValue)> for ProbeResults {
    fn from_iter<I: IntoIterator<Item = (String, RawValue)>>(iter: I) -> Self {
        ProbeResults {
            values: iter.into_iter().collect(),
        }
    }
}

/// Probe results plus the target they were collected for, if recorded.
#[derive(Debug, Clone, Default)]
pub struct ProbeInput {
    pub target: Option<TargetDescriptor>,
    pub results: ProbeResults,
}

/// Encodings probe results can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFormat {
    Toml,
    Json,
    Records,
    Header,
}

impl ProbeFormat {
    /// Pick a format from a file extension; anything unrecognized is
    /// read as text records.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => ProbeFormat::Toml,
            Some("json") => ProbeFormat::Json,
            Some("h") => ProbeFormat::Header,
            _ => ProbeFormat::Records,
        }
    }
}

/// TOML/JSON document shape.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProbeDocument {
    target: TargetSpec,
    probes: BTreeMap<String, RawValue>,
    not_probed: Vec<String>,
}

impl ProbeDocument {
    fn into_input(self) -> Result<ProbeInput, ProbeError> {
        let mut results: ProbeResults = self.probes.into_iter().collect();
        for name in self.not_probed {
            if results.contains(&name) {
                return Err(ProbeError::Duplicate { name, line: 0 });
            }
            results.insert(name, RawValue::NotProbed);
        }
        Ok(ProbeInput {
            target: self.target.to_descriptor()?,
            results,
        })
    }
}

/// Read probe results from a file, choosing the format by extension.
pub fn load_probe_file(path: &Path) -> Result<ProbeInput, ProbeError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ProbeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_probes(&contents, ProbeFormat::from_path(path))
}

/// Parse probe results from text in the given format.
pub fn parse_probes(contents: &str, format: ProbeFormat) -> Result<ProbeInput, ProbeError> {
    match format {
        ProbeFormat::Toml => toml::from_str::<ProbeDocument>(contents)?.into_input(),
        ProbeFormat::Json => serde_json::from_str::<ProbeDocument>(contents)?.into_input(),
        ProbeFormat::Records => Ok(ProbeInput {
            target: None,
            results: parse_records(contents)?,
        }),
        ProbeFormat::Header => Ok(ProbeInput {
            target: None,
            results: parse_header(contents)?,
        }),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Parse an integer literal (decimal or `0x` hex, optionally negative).
fn parse_int(s: &str) -> Option<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()?
    } else if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse::<u64>().ok()?
    } else {
        return None;
    };
    let value = i128::from(magnitude);
    i64::try_from(if negative { -value } else { value }).ok()
}

/// Undo C-style escaping of a quoted string literal body.
fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            d @ '0'..='7' => {
                let mut code = d.to_digit(8)?;
                for _ in 0..2 {
                    let Some(next) = chars.clone().next().and_then(|c| c.to_digit(8)) else {
                        break;
                    };
                    chars.next();
                    code = code * 8 + next;
                }
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Interpret a literal value from records or a header.
fn parse_literal(raw: &str) -> Option<RawValue> {
    let raw = raw.trim();
    match raw {
        "" | "?" => Some(RawValue::NotProbed),
        "true" | "yes" => Some(RawValue::Bool(true)),
        "false" | "no" => Some(RawValue::Bool(false)),
        s if s.starts_with('"') => unquote(s).map(RawValue::Str),
        s => Some(parse_int(s).map(RawValue::Int).unwrap_or_else(|| RawValue::Str(s.to_string()))),
    }
}

/// Parse `NAME=value` records. `#` starts a comment line.
pub fn parse_records(contents: &str) -> Result<ProbeResults, ProbeError> {
    let mut results = ProbeResults::new();

    for (idx, line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, value) = line.split_once('=').ok_or_else(|| ProbeError::Syntax {
            line: line_no,
            message: format!("expected NAME=value, found `{}`", line),
        })?;
        let name = name.trim();
        if !is_identifier(name) {
            return Err(ProbeError::Syntax {
                line: line_no,
                message: format!("`{}` is not a valid fact name", name),
            });
        }

        let value = parse_literal(value).ok_or_else(|| ProbeError::Syntax {
            line: line_no,
            message: format!("malformed string literal for `{}`", name),
        })?;

        if results.insert(name, value).is_some() {
            return Err(ProbeError::Duplicate {
                name: name.to_string(),
                line: line_no,
            });
        }
    }

    Ok(results)
}

static DEFINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#\s*define\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s+(.*?))?\s*$").expect("valid regex")
});
static UNDEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/\*\s*#\s*undef\s+([A-Za-z_][A-Za-z0-9_]*)\s*\*/$").expect("valid regex")
});
static COND_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*(if|ifdef|ifndef)\b\s*(\S*)").expect("valid regex"));
static COND_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*endif\b").expect("valid regex"));
static TRAILING_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*/\*.*\*/\s*$").expect("valid regex"));

/// Replay a generated configuration header as probe results.
///
/// Only top-level definitions are read: lines inside conditional blocks
/// describe other configurations. Two blocks count as top level: an
/// include guard, and an `#ifndef NAME` whose first line defines or
/// undefines `NAME` (a default the compiler command line may override).
/// `#define NAME` with no value reads as `true`; `/* #undef NAME */`
/// reads as `false`. Redefining a name to the same value is allowed.
pub fn parse_header(contents: &str) -> Result<ProbeResults, ProbeError> {
    let mut results = ProbeResults::new();
    let mut depth = 0usize;
    let mut top_level = 0usize;
    let mut pending_guard: Option<(String, usize)> = None;

    for (idx, line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();

        if let Some(caps) = COND_OPEN_RE.captures(line) {
            depth += 1;
            pending_guard = (&caps[1] == "ifndef").then(|| (caps[2].to_string(), line_no));
            continue;
        }
        if COND_CLOSE_RE.is_match(line) {
            depth = depth.saturating_sub(1);
            top_level = top_level.min(depth);
            continue;
        }

        let guards = |name: &str, pending: Option<(String, usize)>| {
            pending.is_some_and(|(guard, guard_line)| guard == name && guard_line + 1 == line_no)
        };

        if let Some(caps) = DEFINE_RE.captures(line) {
            let name = &caps[1];
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let body = TRAILING_COMMENT_RE.replace(body, "");
            let guarded = guards(name, pending_guard.take());

            if guarded && depth == 1 && top_level == 0 && body.is_empty() {
                top_level = depth;
                continue;
            }
            if depth != top_level && !(guarded && depth == top_level + 1) {
                continue;
            }
            let value = if body.is_empty() {
                RawValue::Bool(true)
            } else {
                parse_literal(&body).ok_or_else(|| ProbeError::Syntax {
                    line: line_no,
                    message: format!("malformed value for `{}`", name),
                })?
            };
            record(&mut results, name, value, line_no)?;
            continue;
        }

        if let Some(caps) = UNDEF_RE.captures(line) {
            let name = &caps[1];
            let guarded = guards(name, pending_guard.take());
            if depth != top_level && !(guarded && depth == top_level + 1) {
                continue;
            }
            record(&mut results, name, RawValue::Bool(false), line_no)?;
        }
    }

    Ok(results)
}

fn record(
    results: &mut ProbeResults,
    name: &str,
    value: RawValue,
    line: usize,
) -> Result<(), ProbeError> {
    match results.get(name) {
        Some(existing) if *existing == value => Ok(()),
        Some(_) => Err(ProbeError::Duplicate {
            name: name.to_string(),
            line,
        }),
        None => {
            results.insert(name, value);
            Ok(())
        }
    }
}
