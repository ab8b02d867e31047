//! Validation error types
//!
//! Structured validation errors with field-level details, used for client
//! preconditions and configuration validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation error with field-level details
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[error("Validation failed: {message}")]
pub struct ValidationError {
    /// High-level validation message
    pub message: String,

    /// Field-specific errors
    pub field_errors: Vec<FieldError>,
}

/// Individual field error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field_errors: Vec::new(),
        }
    }

    /// Add a field error
    pub fn add_field_error(
        mut self,
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.field_errors.push(FieldError {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        });
        self
    }

    /// Check if validation has any field errors
    pub fn has_field_errors(&self) -> bool {
        !self.field_errors.is_empty()
    }

    /// Errors reported for one field
    pub fn errors_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.field_errors.iter().filter(move |e| e.field == field)
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut result = ValidationError::new("Configuration validation failed");
        collect_field_errors(&mut result, "", &errors);
        result
    }
}

fn collect_field_errors(result: &mut ValidationError, prefix: &str, errors: &validator::ValidationErrors) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("invalid value for {path}"));
                    result.field_errors.push(FieldError {
                        field: path.clone(),
                        code: error.code.to_string(),
                        message,
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_field_errors(result, &path, nested),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_errors(result, &format!("{path}[{index}]"), nested);
                }
            }
        }
    }
}
