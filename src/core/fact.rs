//! Capability fact schema.
//!
//! A fact's kind and category are fixed by the registry; only its value
//! varies from one target to the next.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The value shape a fact carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    /// Defined as `1` when present, left undefined otherwise
    Boolean,
    /// Integer literal (sizes, alignments, limits)
    Integer,
    /// String or bare token
    String,
    /// Always left undefined on every target
    Undefined,
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Boolean => "boolean",
            FactKind::Integer => "integer",
            FactKind::String => "string",
            FactKind::Undefined => "undefined",
        }
    }
}

impl Default for FactKind {
    fn default() -> Self {
        FactKind::Boolean
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a fact comes from. Declaration order of the variants is the
/// order categories appear in an emitted manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Header,
    Function,
    TypeMember,
    Library,
    NumericLimit,
    Derived,
    PolicyChoice,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Header,
        Category::Function,
        Category::TypeMember,
        Category::Library,
        Category::NumericLimit,
        Category::Derived,
        Category::PolicyChoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Header => "header",
            Category::Function => "function",
            Category::TypeMember => "type-member",
            Category::Library => "library",
            Category::NumericLimit => "numeric-limit",
            Category::Derived => "derived",
            Category::PolicyChoice => "policy-choice",
        }
    }

    /// Heading used for the category banner in a rendered header.
    pub fn title(&self) -> &'static str {
        match self {
            Category::Header => "Header files",
            Category::Function => "Functions",
            Category::TypeMember => "Types and structure members",
            Category::Library => "Libraries",
            Category::NumericLimit => "Sizes, alignments and limits",
            Category::Derived => "Derived facts",
            Category::PolicyChoice => "Build policy",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category `{}`", s))
    }
}

/// How an integer value is spelled in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntFormat {
    #[default]
    Decimal,
    Hex,
}

/// How a string value is spelled in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringStyle {
    /// C string literal: `"Python"`
    #[default]
    Quoted,
    /// A single preprocessor token: `void`
    Bare,
}

/// A resolved fact value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl FactValue {
    pub fn kind(&self) -> FactKind {
        match self {
            FactValue::Bool(_) => FactKind::Boolean,
            FactValue::Int(_) => FactKind::Integer,
            FactValue::Str(_) => FactKind::String,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FactValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FactValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FactValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Bool(b) => write!(f, "{}", b),
            FactValue::Int(i) => write!(f, "{}", i),
            FactValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Registry schema for one capability fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactSpec {
    /// Unique, stable name (the preprocessor symbol)
    pub name: String,
    pub kind: FactKind,
    pub category: Category,
    pub int_format: IntFormat,
    pub string_style: StringStyle,
    /// Human description, rendered as a comment when enabled
    pub doc: Option<String>,
    /// Usable by rules and invariants but never emitted
    pub internal: bool,
    /// Position in the catalog
    pub index: usize,
}

impl FactSpec {
    pub fn new(name: impl Into<String>, kind: FactKind, category: Category) -> Self {
        FactSpec {
            name: name.into(),
            kind,
            category,
            int_format: IntFormat::Decimal,
            string_style: StringStyle::Quoted,
            doc: None,
            internal: false,
            index: 0,
        }
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == FactKind::Boolean
    }

    pub fn is_derived(&self) -> bool {
        self.category == Category::Derived
    }
}

/// Check that a bare string value is a single preprocessor token.
pub fn is_bare_token(s: &str) -> bool {
    !s.is_empty()
        && !s.chars().any(|c| c.is_whitespace() || c.is_control())
        && !s.contains("/*")
        && !s.contains("//")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_order_and_parse() {
        assert!(Category::Header < Category::Function);
        assert!(Category::Derived < Category::PolicyChoice);
        assert_eq!("type-member".parse::<Category>().unwrap(), Category::TypeMember);
        assert!("widgets".parse::<Category>().is_err());
    }

    #[test]
    fn test_fact_value_kind() {
        assert_eq!(FactValue::Bool(true).kind(), FactKind::Boolean);
        assert_eq!(FactValue::Int(8).kind(), FactKind::Integer);
        assert_eq!(FactValue::Str("void".into()).kind(), FactKind::String);
        assert_eq!(FactValue::Int(8).as_int(), Some(8));
        assert_eq!(FactValue::Int(8).as_bool(), None);
    }

    #[test]
    fn test_bare_token() {
        assert!(is_bare_token("void"));
        assert!(is_bare_token("0x1000000"));
        assert!(!is_bare_token(""));
        assert!(!is_bare_token("unsigned int"));
        assert!(!is_bare_token("x/*y*/"));
    }
}
