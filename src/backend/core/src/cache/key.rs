//! Composite timeline keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TrailError};
use crate::identity::ExerciseIdentity;

/// Key prefix, so keys stay recognizable in logs.
pub const KEY_PREFIX: &str = "timeline";

/// Identifies one timeline: `(student, assignment, exercise)`.
///
/// The exercise is stored in canonical form, so every encoding of the same
/// exercise maps to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimelineKey {
    pub student_id: String,
    pub assignment_id: String,
    pub exercise: String,
}

impl TimelineKey {
    /// Build a key, rejecting blank components.
    pub fn new(
        student_id: impl Into<String>,
        assignment_id: impl Into<String>,
        exercise: impl Into<String>,
    ) -> Result<Self> {
        let key = Self {
            student_id: student_id.into().trim().to_string(),
            assignment_id: assignment_id.into().trim().to_string(),
            exercise: exercise.into().trim().to_string(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Build a key from a resolved identity.
    pub fn for_identity(
        student_id: impl Into<String>,
        assignment_id: impl Into<String>,
        identity: &ExerciseIdentity,
    ) -> Result<Self> {
        Self::new(student_id, assignment_id, identity.canonical())
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("student_id", &self.student_id),
            ("assignment_id", &self.assignment_id),
            ("exercise", &self.exercise),
        ] {
            if value.is_empty() {
                return Err(TrailError::validation(format!("{} must not be empty", field))
                    .with_context("field", field));
            }
        }
        Ok(())
    }

    /// Flat string form.
    pub fn build(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            KEY_PREFIX, self.student_id, self.assignment_id, self.exercise
        )
    }
}

impl fmt::Display for TimelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}
