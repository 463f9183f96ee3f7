//! Progress value object for form completion tracking.
//!
//! # Design
//!
//! Generation services occasionally report progress outside [0, 100].
//! `Progress::new` clamps rather than rejects, and the `Deserialize`
//! impl does the same, so a single out-of-range number never poisons
//! an otherwise valid state document. `try_new` exists for call sites
//! that want strict validation.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::ValidationError;

/// Form completion percentage, always within [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Progress(u8);

impl Progress {
    pub const ZERO: Progress = Progress(0);
    pub const COMPLETE: Progress = Progress(100);

    /// Creates a Progress, clamping the value into [0, 100].
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    /// Creates a Progress, rejecting values outside [0, 100].
    pub fn try_new(value: i64) -> Result<Self, ValidationError> {
        if !(0..=100).contains(&value) {
            return Err(ValidationError::out_of_range("progress", 0, 100, value));
        }
        Ok(Self(value as u8))
    }

    /// Returns the value as a u8 in [0, 100].
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Returns the value as a fraction in [0.0, 1.0].
    pub fn as_fraction(&self) -> f32 {
        f32::from(self.0) / 100.0
    }

    /// Returns the completion phase this value falls in.
    pub fn phase(&self) -> FormPhase {
        match self.0 {
            0 => FormPhase::Empty,
            100 => FormPhase::Complete,
            _ => FormPhase::InProgress,
        }
    }

    /// Returns true once the form is fully filled.
    pub fn is_complete(&self) -> bool {
        self.0 >= 100
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl<'de> Deserialize<'de> for Progress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Ok(Progress::new(raw))
    }
}

/// Completion phase of a form, derived from its progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormPhase {
    /// No information captured yet.
    Empty,
    /// Partially filled.
    InProgress,
    /// All required fields captured. Further writes are still allowed.
    Complete,
}
