//! Exercise identity resolution.
//!
//! The two event stores disagree on how they name an exercise: the
//! fine-grained tracker writes a zero-based `problem_index`, the coarse log
//! writes a one-based `exercise_id`, and either may be stored as a number or
//! as a string. An [`ExerciseIdentity`] is computed once per request and
//! carries every encoding a record may use, so matching never has to guess.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Field names under which a raw record may carry its exercise reference.
pub const REFERENCE_FIELDS: [&str; 2] = ["exercise_id", "problem_index"];

// =============================================================================
// Exercise Reference
// =============================================================================

/// One encoding of an exercise reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExerciseRef {
    Number(i64),
    Text(String),
}

impl ExerciseRef {
    /// Read a reference out of an untyped JSON value.
    ///
    /// Integral floats (`3.0`) become numbers; blank strings, `null`, and
    /// structured values are not references.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Number(i))
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Some(Self::Number(f as i64))
                        }
                        Some(_) => Some(Self::Text(n.to_string())),
                        None => None,
                    }
                }
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self::Text(trimmed.to_string()))
                }
            }
            _ => None,
        }
    }

    /// Text form, as `str()` / `String()` would produce it.
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Integer form, when the reference is numeric.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse::<i64>().ok(),
        }
    }

    /// Any-form equality: same text, or same integer value.
    pub fn loosely_eq(&self, other: &Self) -> bool {
        if self.as_text() == other.as_text() {
            return true;
        }
        matches!((self.as_int(), other.as_int()), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Display for ExerciseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

impl From<i64> for ExerciseRef {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ExerciseRef {
    fn from(value: &str) -> Self {
        Self::Text(value.trim().to_string())
    }
}

impl From<String> for ExerciseRef {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

// =============================================================================
// Exercise Identity
// =============================================================================

/// A canonical exercise reference plus every equivalent encoding of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExerciseIdentity {
    value: ExerciseRef,
    aliases: Vec<ExerciseRef>,
}

impl ExerciseIdentity {
    /// Resolve an identity. Never fails; non-numeric references only get
    /// their string form.
    ///
    /// The alias set is `{ value, String(value), Int(value), Int(value) - 1 }`
    /// where the integer forms exist only for numeric references and the
    /// zero-based form only when `Int(value) >= 1`.
    pub fn resolve(value: impl Into<ExerciseRef>) -> Self {
        let value = value.into();
        let mut aliases: Vec<ExerciseRef> = Vec::with_capacity(4);
        let mut push = |alias: ExerciseRef| {
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        };

        push(value.clone());
        push(ExerciseRef::Text(value.as_text()));
        if let Some(n) = value.as_int() {
            push(ExerciseRef::Number(n));
            if n >= 1 {
                push(ExerciseRef::Number(n - 1));
            }
        }

        Self { value, aliases }
    }

    /// The reference as declared in the exercise catalog.
    pub fn value(&self) -> &ExerciseRef {
        &self.value
    }

    pub fn aliases(&self) -> &[ExerciseRef] {
        &self.aliases
    }

    /// Canonical string used in cache keys and URLs.
    pub fn canonical(&self) -> String {
        self.value.as_text()
    }

    /// Whether a single extracted reference belongs to this exercise.
    pub fn matches(&self, candidate: &ExerciseRef) -> bool {
        self.aliases.iter().any(|alias| alias.loosely_eq(candidate))
    }

    /// Whether a raw record belongs to this exercise, checking every field
    /// name the stores use for the reference.
    pub fn matches_record(&self, record: &Value) -> bool {
        extract_references(record)
            .iter()
            .any(|candidate| self.matches(candidate))
    }
}

impl fmt::Display for ExerciseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Every exercise reference present on a raw record, in field order.
pub fn extract_references(record: &Value) -> Vec<ExerciseRef> {
    REFERENCE_FIELDS
        .iter()
        .filter_map(|field| record.get(*field))
        .filter_map(ExerciseRef::from_json)
        .collect()
}

/// The first exercise reference present on a raw record.
pub fn extract_reference(record: &Value) -> Option<ExerciseRef> {
    extract_references(record).into_iter().next()
}

// =============================================================================
// Resolver
// =============================================================================

/// Memoizing resolver. Resolution is pure, so a cached identity is
/// interchangeable with a freshly computed one.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    cache: Arc<DashMap<ExerciseRef, ExerciseIdentity>>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, value: impl Into<ExerciseRef>) -> ExerciseIdentity {
        let value = value.into();
        if let Some(hit) = self.cache.get(&value) {
            return hit.clone();
        }
        let identity = ExerciseIdentity::resolve(value.clone());
        self.cache.insert(value, identity.clone());
        identity
    }

    /// Resolve a reference received as a path or query string.
    pub fn resolve_str(&self, raw: &str) -> ExerciseIdentity {
        self.resolve(ExerciseRef::from(raw))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_string_aliases() {
        let identity = ExerciseIdentity::resolve("3");
        let aliases = identity.aliases();
        assert!(aliases.contains(&ExerciseRef::Text("3".into())));
        assert!(aliases.contains(&ExerciseRef::Number(3)));
        assert!(aliases.contains(&ExerciseRef::Number(2)));
        assert_eq!(aliases.len(), 3);
    }

    #[test]
    fn test_zero_has_no_zero_based_alias() {
        let identity = ExerciseIdentity::resolve(0);
        assert_eq!(
            identity.aliases(),
            &[ExerciseRef::Number(0), ExerciseRef::Text("0".into())]
        );
    }

    #[test]
    fn test_non_numeric_identity() {
        let identity = ExerciseIdentity::resolve("loops-intro");
        assert_eq!(identity.aliases(), &[ExerciseRef::Text("loops-intro".into())]);
        assert!(identity.matches_record(&json!({"exercise_id": "loops-intro"})));
        assert!(!identity.matches_record(&json!({"problem_index": 0})));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        assert_eq!(ExerciseIdentity::resolve("7"), ExerciseIdentity::resolve("7"));
        let resolver = IdentityResolver::new();
        let first = resolver.resolve_str("7");
        let second = resolver.resolve_str("7");
        assert_eq!(first, second);
        assert_eq!(first, ExerciseIdentity::resolve("7"));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_matches_either_field_and_convention() {
        let identity = ExerciseIdentity::resolve("3");
        assert!(identity.matches_record(&json!({"exercise_id": 2})));
        assert!(identity.matches_record(&json!({"problem_index": "3"})));
        assert!(identity.matches_record(&json!({"problem_index": 2.0})));
        assert!(!identity.matches_record(&json!({"problem_index": 4})));
        assert!(!identity.matches_record(&json!({"code": "x = 1"})));
    }

    #[test]
    fn test_loose_equality() {
        assert!(ExerciseRef::Text("02".into()).loosely_eq(&ExerciseRef::Number(2)));
        assert!(!ExerciseRef::Text("abc".into()).loosely_eq(&ExerciseRef::Number(0)));
    }

    #[test]
    fn test_from_json_rejects_structured_values() {
        assert_eq!(ExerciseRef::from_json(&json!(null)), None);
        assert_eq!(ExerciseRef::from_json(&json!("  ")), None);
        assert_eq!(ExerciseRef::from_json(&json!({"id": 1})), None);
        assert_eq!(ExerciseRef::from_json(&json!(1.5)), Some(ExerciseRef::Text("1.5".into())));
    }

    #[test]
    fn test_extract_reference_prefers_exercise_id() {
        let record = json!({"problem_index": 0, "exercise_id": "1"});
        assert_eq!(extract_reference(&record), Some(ExerciseRef::Text("1".into())));
        assert_eq!(extract_references(&record).len(), 2);
    }
}
