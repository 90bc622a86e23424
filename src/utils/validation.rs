// src/utils/validation.rs
//! Input validation for operator-supplied settings

use crate::error::{DaqError, DaqResult};

/// Characters allowed in a recording directory besides alphanumerics
const DIRECTORY_EXTRA_CHARS: &[char] = &['_', '-', '.', '/'];

/// Characters allowed in a project name besides alphanumerics. The project
/// is part of the log file name, so path separators are excluded.
const PROJECT_EXTRA_CHARS: &[char] = &['_', '-'];

fn validate_charset(field: &str, value: &str, extra: &[char]) -> DaqResult<()> {
    if value.is_empty() {
        return Err(DaqError::InvalidInput {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || extra.contains(c)))
    {
        return Err(DaqError::InvalidInput {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!(
                "character {:?} is not allowed, use letters, digits and {}",
                bad,
                extra.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
            ),
        });
    }

    Ok(())
}

/// Validate a recording directory
pub fn validate_directory(value: &str) -> DaqResult<()> {
    validate_charset("directory", value, DIRECTORY_EXTRA_CHARS)
}

/// Validate a project name
pub fn validate_project(value: &str) -> DaqResult<()> {
    validate_charset("project", value, PROJECT_EXTRA_CHARS)
}
