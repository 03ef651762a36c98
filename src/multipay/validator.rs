use super::error::FormatViolation;
use super::types::ReferenceEntry;

pub const REFERENCE_LENGTH: usize = 16;
pub const MAX_REFERENCES: usize = 10;

/// Local checks on a user-entered reference. No I/O.
pub struct ReferenceValidator;

impl ReferenceValidator {
    /// Runs the format rules in order and returns the trimmed reference.
    ///
    /// The first failing rule wins: blank input, wrong length, a value already
    /// in `entries` (exact match), then a full collection. Both the raw input
    /// and the trimmed value must be exactly [`REFERENCE_LENGTH`] characters,
    /// so surrounding whitespace never shortens a stored reference.
    pub fn validate_format(
        input: &str,
        entries: &[ReferenceEntry],
    ) -> Result<String, FormatViolation> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FormatViolation::Required);
        }

        if input.chars().count() != REFERENCE_LENGTH
            || trimmed.chars().count() != REFERENCE_LENGTH
        {
            return Err(FormatViolation::InvalidLength);
        }

        if entries.iter().any(|entry| entry.value == trimmed) {
            return Err(FormatViolation::Duplicate);
        }

        if entries.len() >= MAX_REFERENCES {
            return Err(FormatViolation::LimitReached);
        }

        Ok(trimmed.to_string())
    }
}
