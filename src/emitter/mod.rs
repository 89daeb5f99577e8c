//! Manifest rendering.
//!
//! Rendering is a pure function of the manifest and options: facts are
//! written in registry emission order, values are spelled the same way on
//! every host, and nothing time- or environment-dependent is included.

use std::fmt::Write as _;

use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::fact::{Category, FactKind, FactValue, IntFormat, StringStyle};
use crate::core::manifest::{ManifestEntry, ResolvedManifest};
use crate::core::target::TargetDescriptor;

/// Default include guard for rendered headers.
pub const DEFAULT_GUARD: &str = "CAPGEN_CONFIG_H";

/// Output representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    /// C header of `#define` / `/* #undef */` lines
    #[default]
    Header,
    /// Machine-readable JSON document
    Json,
}

impl std::str::FromStr for ManifestFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "header" | "h" => Ok(ManifestFormat::Header),
            "json" => Ok(ManifestFormat::Json),
            other => Err(format!("unknown manifest format `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
    pub format: ManifestFormat,
    /// Include guard macro; `None` writes no guard
    pub guard: Option<String>,
    /// Write the leading banner comment
    pub banner: bool,
    /// Write each fact's doc string as a comment above it
    pub comments: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            format: ManifestFormat::Header,
            guard: Some(DEFAULT_GUARD.to_string()),
            banner: true,
            comments: true,
        }
    }
}

#[derive(Debug, Error, MietteDiagnostic)]
pub enum EmitError {
    #[error("refusing to emit the failed manifest for {target}")]
    #[diagnostic(
        code(capgen::emit::precondition_violation),
        help("Resolve every error-severity diagnostic before emitting")
    )]
    PreconditionViolation { target: String },

    #[error("include guard `{0}` is not a valid identifier")]
    #[diagnostic(code(capgen::emit::invalid_guard))]
    InvalidGuard(String),

    #[error("failed to serialize manifest: {0}")]
    #[diagnostic(code(capgen::emit::json))]
    Json(#[from] serde_json::Error),
}

/// Render a manifest in the configured format.
pub fn emit(manifest: &ResolvedManifest<'_>, options: &EmitOptions) -> Result<Vec<u8>, EmitError> {
    let text = match options.format {
        ManifestFormat::Header => render_header(manifest, options)?,
        ManifestFormat::Json => render_json(manifest)?,
    };
    Ok(text.into_bytes())
}

fn check_precondition(manifest: &ResolvedManifest<'_>) -> Result<(), EmitError> {
    if manifest.is_success() {
        Ok(())
    } else {
        Err(EmitError::PreconditionViolation {
            target: manifest.target().triple.clone(),
        })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Spell a value as a C preprocessor literal.
pub fn format_value(entry: &ManifestEntry<'_>, value: &FactValue) -> String {
    match value {
        FactValue::Bool(true) => "1".to_string(),
        FactValue::Bool(false) => "0".to_string(),
        FactValue::Int(i) => match entry.spec.int_format {
            IntFormat::Decimal => i.to_string(),
            IntFormat::Hex if *i < 0 => format!("-0x{:x}", i.unsigned_abs()),
            IntFormat::Hex => format!("0x{:x}", i),
        },
        FactValue::Str(s) => match entry.spec.string_style {
            StringStyle::Bare => s.clone(),
            StringStyle::Quoted => quote(s),
        },
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn comment(text: &str) -> String {
    format!("/* {} */", text.replace("*/", "* /"))
}

/// Render the `#define` / `/* #undef */` header form.
pub fn render_header(
    manifest: &ResolvedManifest<'_>,
    options: &EmitOptions,
) -> Result<String, EmitError> {
    check_precondition(manifest)?;
    if let Some(ref guard) = options.guard {
        if !is_identifier(guard) {
            return Err(EmitError::InvalidGuard(guard.clone()));
        }
    }

    let mut out = String::new();
    if options.banner {
        let _ = writeln!(
            out,
            "{}",
            comment(&format!(
                "Platform capabilities for {}. Generated by capgen; do not edit.",
                manifest.target().summary()
            ))
        );
        out.push('\n');
    }
    if let Some(ref guard) = options.guard {
        let _ = writeln!(out, "#ifndef {}", guard);
        let _ = writeln!(out, "#define {}", guard);
        out.push('\n');
    }

    let mut current: Option<Category> = None;
    for entry in manifest.emitted() {
        if current != Some(entry.spec.category) {
            if current.is_some() {
                out.push('\n');
            }
            let _ = writeln!(out, "{}", comment(entry.spec.category.title()));
            out.push('\n');
            current = Some(entry.spec.category);
        }

        if options.comments {
            if let Some(ref doc) = entry.spec.doc {
                let _ = writeln!(out, "{}", comment(doc));
            }
        }

        match entry.value {
            Some(value) if entry.spec.kind != FactKind::Undefined => {
                let _ = writeln!(out, "#define {} {}", entry.name(), format_value(&entry, value));
            }
            _ => {
                let _ = writeln!(out, "/* #undef {} */", entry.name());
            }
        }
    }

    if let Some(ref guard) = options.guard {
        out.push('\n');
        let _ = writeln!(out, "#endif {}", comment(guard));
    }
    Ok(out)
}

#[derive(Serialize)]
struct JsonManifest<'a> {
    target: &'a TargetDescriptor,
    fingerprint: String,
    facts: Vec<JsonFact<'a>>,
}

#[derive(Serialize)]
struct JsonFact<'a> {
    name: &'a str,
    category: Category,
    kind: FactKind,
    value: Option<&'a FactValue>,
}

/// Render the manifest as a JSON document.
pub fn render_json(manifest: &ResolvedManifest<'_>) -> Result<String, EmitError> {
    check_precondition(manifest)?;
    let doc = JsonManifest {
        target: manifest.target(),
        fingerprint: manifest.fingerprint(),
        facts: manifest
            .emitted()
            .map(|entry| JsonFact {
                name: entry.name(),
                category: entry.spec.category,
                kind: entry.spec.kind,
                value: entry.value,
            })
            .collect(),
    };
    let mut text = serde_json::to_string_pretty(&doc)?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::probe::RawValue;
    use crate::resolver::Resolver;
    use crate::test_support::*;

    #[test]
    fn test_render_ios_simulator() {
        let resolution = Resolver::new(builtin()).resolve(&ios_simulator_target(), &ios_simulator_probes());
        let header = render_header(&resolution.manifest, &EmitOptions::default()).unwrap();

        assert!(header.starts_with("/* Platform capabilities for x86_64-apple-ios-simulator (64-bit, little-endian)."));
        assert!(header.contains("#ifndef CAPGEN_CONFIG_H\n#define CAPGEN_CONFIG_H\n"));
        assert!(header.contains("/* Header files */\n\n#define HAVE_ALLOCA_H 1\n"));
        assert!(header.contains("#define THREAD_STACK_SIZE 0x1000000\n"));
        assert!(header.contains("#define RETSIGTYPE void\n"));
        assert!(header.contains("#define _PYTHONFRAMEWORK \"Python\"\n"));
        assert!(header.contains("#define PY_BUILTIN_HASHLIB_HASHES \"md5,sha1,sha2,sha3,blake2\"\n"));
        assert!(header.contains("#define HAVE_DECL_RTLD_DEEPBIND 0\n"));
        assert!(header.contains("#define SIZEOF_VOID_P 8\n"));
        assert!(header.contains("/* #undef HAVE_LARGEFILE_SUPPORT */\n"));
        assert!(header.contains("/* #undef size_t */\n"));
        assert!(!header.contains("ENDIANNESS"));
        assert!(header.ends_with("#endif /* CAPGEN_CONFIG_H */\n"));
    }

    #[test]
    fn test_categories_in_order() {
        let resolution = Resolver::new(builtin()).resolve(&ios_simulator_target(), &ios_simulator_probes());
        let header = render_header(&resolution.manifest, &EmitOptions::default()).unwrap();

        let positions: Vec<usize> = Category::ALL
            .iter()
            .map(|c| header.find(&comment(c.title())).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_emission_is_idempotent() {
        let resolution = Resolver::new(builtin()).resolve(&ios_simulator_target(), &ios_simulator_probes());
        let options = EmitOptions::default();
        assert_eq!(
            emit(&resolution.manifest, &options).unwrap(),
            emit(&resolution.manifest, &options).unwrap()
        );
    }

    #[test]
    fn test_distinct_manifests_render_distinctly() {
        let resolver = Resolver::new(builtin());
        let target = ios_simulator_target();
        let mut raw = ios_simulator_primitives();
        let a = resolver.resolve(&target, &raw);
        raw.insert("HAVE_FORK", RawValue::Bool(false));
        let b = resolver.resolve(&target, &raw);
        raw.insert("HAVE_FORK", RawValue::NotProbed);
        let c = resolver.resolve(&target, &raw);

        let options = EmitOptions::default();
        let ra = render_header(&a.manifest, &options).unwrap();
        let rb = render_header(&b.manifest, &options).unwrap();
        let rc = render_header(&c.manifest, &options).unwrap();
        assert_ne!(ra, rb);
        // Probed-absent and not probed are the same manifest
        assert_eq!(b.manifest, c.manifest);
        assert_eq!(rb, rc);
    }

    #[test]
    fn test_failed_manifest_is_refused() {
        let mut raw = ios_simulator_primitives();
        raw.remove("SIZEOF_LONG");
        let resolution = Resolver::new(builtin()).resolve(&ios_simulator_target(), &raw);

        let err = emit(&resolution.manifest, &EmitOptions::default()).unwrap_err();
        assert!(matches!(err, EmitError::PreconditionViolation { .. }));
        assert!(render_json(&resolution.manifest).is_err());
    }

    #[test]
    fn test_options() {
        let resolution = Resolver::new(builtin()).resolve(&ios_simulator_target(), &ios_simulator_probes());
        let options = EmitOptions {
            guard: None,
            banner: false,
            ..EmitOptions::default()
        };
        let header = render_header(&resolution.manifest, &options).unwrap();
        assert!(header.starts_with("/* Header files */"));
        assert!(!header.contains("#ifndef"));
        assert!(header.contains("/* Default thread stack size in bytes */\n#define THREAD_STACK_SIZE"));

        let bare = EmitOptions {
            comments: false,
            ..EmitOptions::default()
        };
        let header = render_header(&resolution.manifest, &bare).unwrap();
        assert!(header.contains("\n#define THREAD_STACK_SIZE 0x1000000\n"));
        assert!(!header.contains("Default thread stack size"));

        let bad = EmitOptions {
            guard: Some("NOT A GUARD".into()),
            ..EmitOptions::default()
        };
        assert!(matches!(
            render_header(&resolution.manifest, &bad),
            Err(EmitError::InvalidGuard(_))
        ));
    }

    #[test]
    fn test_json() {
        let resolution = Resolver::new(builtin()).resolve(&ios_simulator_target(), &ios_simulator_probes());
        let text = render_json(&resolution.manifest).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(doc["target"]["triple"], "x86_64-apple-ios-simulator");
        let facts = doc["facts"].as_array().unwrap();
        assert_eq!(facts.len(), builtin().emission_order().count());
        let stack = facts
            .iter()
            .find(|f| f["name"] == "THREAD_STACK_SIZE")
            .unwrap();
        assert_eq!(stack["value"], 0x1000000);
        assert_eq!(stack["category"], "numeric-limit");

        let names: Vec<&str> = resolution.manifest.emitted().map(|e| e.name()).collect();
        assert_eq!(names.len(), facts.len());
        for (name, fact) in names.iter().zip(facts) {
            assert_eq!(fact["name"], *name);
        }
    }

    #[test]
    fn test_format_value_escapes() {
        assert_eq!(quote("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(quote("a\r\nb"), "\"a\\r\\nb\"");
        assert_eq!(quote("bell\x07\x1b"), "\"bell\\007\\033\"");
        assert_eq!(quote("del\x7f"), "\"del\\177\"");
        assert_eq!(comment("x */ y"), "/* x * / y */");
    }
}
