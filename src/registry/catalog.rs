//! On-disk catalog format.
//!
//! ```toml
//! schema = "1.0.0"
//!
//! [[section]]
//! category = "header"
//! facts = ["HAVE_UNISTD_H", { name = "HAVE_SYS_WAIT_H", doc = "..." }]
//!
//! [[conflict]]
//! name = "curses"
//! members = ["HAVE_NCURSES", "HAVE_NCURSESW"]
//! prefer = [["HAVE_NCURSESW", "HAVE_NCURSES"]]
//!
//! [[rule]]
//! output = "HAVE_DYNAMIC_LOADING"
//! kind = "any_of"
//! inputs = ["HAVE_DLOPEN"]
//!
//! [[invariant]]
//! name = "long-at-least-int"
//! kind = "compare"
//! left = "SIZEOF_LONG"
//! op = ">="
//! right = "SIZEOF_INT"
//! ```

use serde::Deserialize;

use super::rules::{ConflictGroup, DerivationRule, Invariant};
use super::{ProbeRegistry, RegistryBuilder, RegistryError};
use crate::core::fact::{Category, FactKind, FactSpec, IntFormat, StringStyle};

/// Catalog schema versions this build understands.
pub fn supported_schema() -> semver::VersionReq {
    semver::VersionReq {
        comparators: vec![semver::Comparator {
            op: semver::Op::Caret,
            major: 1,
            minor: None,
            patch: None,
            pre: semver::Prerelease::EMPTY,
        }],
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    pub schema: semver::Version,
    #[serde(default, rename = "section")]
    pub sections: Vec<Section>,
    #[serde(default, rename = "conflict")]
    pub conflicts: Vec<ConflictGroup>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<DerivationRule>,
    #[serde(default, rename = "invariant")]
    pub invariants: Vec<Invariant>,
}

/// A run of facts sharing a category and defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Section {
    pub category: Category,
    #[serde(default)]
    pub kind: FactKind,
    #[serde(default)]
    pub format: IntFormat,
    #[serde(default)]
    pub style: StringStyle,
    #[serde(default)]
    pub internal: bool,
    pub facts: Vec<FactEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FactEntry {
    Name(String),
    Detailed(FactDetail),
}

/// Per-fact overrides of the section defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactDetail {
    pub name: String,
    pub kind: Option<FactKind>,
    pub format: Option<IntFormat>,
    pub style: Option<StringStyle>,
    pub doc: Option<String>,
    pub internal: Option<bool>,
}

impl Section {
    fn specs(&self) -> impl Iterator<Item = FactSpec> + '_ {
        self.facts.iter().map(move |entry| match entry {
            FactEntry::Name(name) => {
                let mut spec = FactSpec::new(name.clone(), self.kind, self.category);
                spec.int_format = self.format;
                spec.string_style = self.style;
                spec.internal = self.internal;
                spec
            }
            FactEntry::Detailed(detail) => {
                let mut spec = FactSpec::new(
                    detail.name.clone(),
                    detail.kind.unwrap_or(self.kind),
                    self.category,
                );
                spec.int_format = detail.format.unwrap_or(self.format);
                spec.string_style = detail.style.unwrap_or(self.style);
                spec.internal = detail.internal.unwrap_or(self.internal);
                spec.doc = detail.doc.clone();
                spec
            }
        })
    }
}

impl Catalog {
    pub fn into_registry(self) -> Result<ProbeRegistry, RegistryError> {
        let mut builder = RegistryBuilder::new(self.schema);
        for section in &self.sections {
            for spec in section.specs() {
                builder = builder.fact(spec);
            }
        }
        for group in self.conflicts {
            builder = builder.conflict(group);
        }
        for rule in self.rules {
            builder = builder.rule(rule);
        }
        for invariant in self.invariants {
            builder = builder.invariant(invariant);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RuleKind;

    const SMALL: &str = r#"
schema = "1.0.0"

[[section]]
category = "header"
facts = ["HAVE_NDIR_H", "HAVE_DIRENT_H"]

[[section]]
category = "numeric-limit"
kind = "integer"
facts = [
    "SIZEOF_INT",
    { name = "THREAD_STACK_SIZE", format = "hex", doc = "Default thread stack size" },
]

[[section]]
category = "derived"
facts = ["HAVE_ANY_DIR_H"]

[[conflict]]
name = "directory-header"
members = ["HAVE_DIRENT_H", "HAVE_NDIR_H"]
prefer = [["HAVE_DIRENT_H", "HAVE_NDIR_H"]]

[[rule]]
output = "HAVE_ANY_DIR_H"
kind = "any_of"
inputs = ["HAVE_DIRENT_H", "HAVE_NDIR_H"]

[[invariant]]
name = "int-size"
kind = "range"
fact = "SIZEOF_INT"
min = 2
max = 8
"#;

    #[test]
    fn test_parse_small_catalog() {
        let registry = ProbeRegistry::from_toml_str(SMALL).unwrap();
        assert_eq!(registry.len(), 5);

        let stack = registry.lookup("THREAD_STACK_SIZE").unwrap();
        assert_eq!(stack.kind, FactKind::Integer);
        assert_eq!(stack.int_format, IntFormat::Hex);
        assert_eq!(stack.doc.as_deref(), Some("Default thread stack size"));

        let group = &registry.conflict_groups()[0];
        assert!(group.prefers("HAVE_DIRENT_H", "HAVE_NDIR_H"));

        let rule = registry.rule_for("HAVE_ANY_DIR_H").unwrap();
        assert!(matches!(rule.kind, RuleKind::AnyOf { .. }));
        assert_eq!(registry.invariants().len(), 1);
    }

    #[test]
    fn test_schema_version_checked() {
        let err = ProbeRegistry::from_toml_str(&SMALL.replace("1.0.0", "2.1.0")).unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedSchema { .. }));
    }

    #[test]
    fn test_malformed_catalog() {
        let err = ProbeRegistry::from_toml_str("schema = \"1.0.0\"\n[[section]]\n").unwrap_err();
        assert!(matches!(err, RegistryError::Parse(_)));
    }

    #[test]
    fn test_misspelled_keys_rejected() {
        let typos = [
            ("required = false\nkind = \"any_of\"", "requried = true\nkind = \"any_of\""),
            ("prefer = [[", "prefr = [["),
            ("min = 2", "minimum = 2"),
            ("format = \"hex\"", "fromat = \"hex\""),
            ("schema = \"1.0.0\"", "schema = \"1.0.0\"\nschemas = 1"),
        ];
        let base = SMALL.replace("kind = \"any_of\"", "required = false\nkind = \"any_of\"");
        assert!(ProbeRegistry::from_toml_str(&base).is_ok());

        for (good, bad) in typos {
            assert!(base.contains(good), "{}", good);
            let err = ProbeRegistry::from_toml_str(&base.replacen(good, bad, 1)).unwrap_err();
            assert!(matches!(err, RegistryError::Parse(_)), "{} was accepted", bad);
        }
    }
}
