//! Schema validation and type coercion of raw probe results.

use std::fmt;

use crate::core::fact::{is_bare_token, FactKind, FactSpec, FactValue, StringStyle};
use crate::core::manifest::Origin;
use crate::core::probe::{ProbeResults, RawValue};
use crate::registry::ProbeRegistry;
use crate::util::diagnostic::{suggestions, Diagnostic, DiagnosticCode};

use super::FactTable;

/// A raw value that does not fit its fact's kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoerceError {
    pub expected: FactKind,
    pub found: RawValue,
    pub reason: Option<&'static str>,
}

impl fmt::Display for CoerceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} value, got {} {}",
            self.expected,
            self.found.type_name(),
            self.found
        )?;
        if let Some(reason) = self.reason {
            write!(f, " ({})", reason)?;
        }
        Ok(())
    }
}

/// Coerce a raw value to `spec`'s kind.
///
/// `Ok(None)` means the fact is undefined. `false` is accepted for every
/// kind as "probed absent"; a boolean fact keeps it as `Bool(false)`.
pub fn coerce(spec: &FactSpec, raw: &RawValue) -> Result<Option<FactValue>, CoerceError> {
    let mismatch = |reason| CoerceError {
        expected: spec.kind,
        found: raw.clone(),
        reason,
    };

    match (spec.kind, raw) {
        (_, RawValue::NotProbed) => Ok(None),
        (FactKind::Boolean, RawValue::Bool(b)) => Ok(Some(FactValue::Bool(*b))),
        (_, RawValue::Bool(false)) => Ok(None),
        (FactKind::Boolean, RawValue::Int(0)) => Ok(Some(FactValue::Bool(false))),
        (FactKind::Boolean, RawValue::Int(1)) => Ok(Some(FactValue::Bool(true))),
        (FactKind::Integer, RawValue::Int(i)) => Ok(Some(FactValue::Int(*i))),
        (FactKind::String, RawValue::Str(s)) => {
            if spec.string_style == StringStyle::Bare && !is_bare_token(s) {
                Err(mismatch(Some("not a single token")))
            } else {
                Ok(Some(FactValue::Str(s.clone())))
            }
        }
        (FactKind::Undefined, _) => Err(mismatch(Some("this fact is never defined"))),
        _ => Err(mismatch(None)),
    }
}

/// Validate names, coerce values and load them into `table`.
///
/// Returns raw values reported for derived facts; those are never loaded
/// but are checked against the derived value later.
pub(crate) fn ingest<'a>(
    registry: &ProbeRegistry,
    raw: &'a ProbeResults,
    table: &mut FactTable<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<(&'a str, &'a RawValue)> {
    let mut reported = Vec::new();

    for (name, value) in raw.iter() {
        let Some(spec) = registry.get(name) else {
            diagnostics.push(
                Diagnostic::error(format!("`{}` is not a known fact; value ignored", name))
                    .with_code(DiagnosticCode::UnknownFact)
                    .with_subject(name)
                    .with_suggestion(suggestions::UNKNOWN_FACT),
            );
            continue;
        };

        if spec.is_derived() {
            if *value != RawValue::NotProbed {
                tracing::debug!("{} is derived; raw value {} only cross-checked", name, value);
                reported.push((name, value));
            }
            continue;
        }

        match coerce(spec, value) {
            Ok(coerced) => {
                let origin = match (spec.kind, value) {
                    (FactKind::Undefined, _) => Origin::AlwaysUndefined,
                    (_, RawValue::NotProbed) => Origin::NotProbed,
                    _ => Origin::Probed,
                };
                table.set(spec, coerced, origin);
            }
            Err(err) => {
                diagnostics.push(
                    Diagnostic::error(format!("{}; treated as undefined", err))
                        .with_code(DiagnosticCode::TypeMismatch)
                        .with_subject(name),
                );
                table.set(spec, None, Origin::Rejected);
            }
        }
    }

    reported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fact::Category;

    fn spec(kind: FactKind) -> FactSpec {
        FactSpec::new("X", kind, Category::NumericLimit)
    }

    #[test]
    fn test_boolean_coercion() {
        let s = spec(FactKind::Boolean);
        assert_eq!(coerce(&s, &RawValue::Bool(true)), Ok(Some(FactValue::Bool(true))));
        assert_eq!(coerce(&s, &RawValue::Bool(false)), Ok(Some(FactValue::Bool(false))));
        assert_eq!(coerce(&s, &RawValue::Int(1)), Ok(Some(FactValue::Bool(true))));
        assert_eq!(coerce(&s, &RawValue::Int(0)), Ok(Some(FactValue::Bool(false))));
        assert_eq!(coerce(&s, &RawValue::NotProbed), Ok(None));
        assert!(coerce(&s, &RawValue::Int(2)).is_err());
        assert!(coerce(&s, &RawValue::Str("yes please".into())).is_err());
    }

    #[test]
    fn test_integer_coercion() {
        let s = spec(FactKind::Integer);
        assert_eq!(coerce(&s, &RawValue::Int(8)), Ok(Some(FactValue::Int(8))));
        assert_eq!(coerce(&s, &RawValue::Bool(false)), Ok(None));
        let err = coerce(&s, &RawValue::Bool(true)).unwrap_err();
        assert_eq!(err.to_string(), "expected integer value, got boolean true");
        assert!(coerce(&s, &RawValue::Str("8".into())).is_err());
    }

    #[test]
    fn test_string_coercion() {
        let mut s = spec(FactKind::String);
        assert_eq!(
            coerce(&s, &RawValue::Str("md5,sha1".into())),
            Ok(Some(FactValue::Str("md5,sha1".into())))
        );
        s.string_style = StringStyle::Bare;
        assert_eq!(
            coerce(&s, &RawValue::Str("void".into())),
            Ok(Some(FactValue::Str("void".into())))
        );
        assert!(coerce(&s, &RawValue::Str("unsigned int".into())).is_err());
        assert!(coerce(&s, &RawValue::Int(1)).is_err());
    }

    #[test]
    fn test_undefined_kind_rejects_values() {
        let s = spec(FactKind::Undefined);
        assert_eq!(coerce(&s, &RawValue::Bool(false)), Ok(None));
        assert_eq!(coerce(&s, &RawValue::NotProbed), Ok(None));
        assert!(coerce(&s, &RawValue::Str("int".into())).is_err());
    }
}
