//! Configuration validation for Zero services.
//!
//! Sections implement [`Validate`]; a [`Validator`] collects every failure so
//! a bad config reports all of its problems at once.

use thiserror::Error;

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Flatten into one message per underlying failure.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Multiple(errors) => errors.iter().flat_map(|e| e.messages()).collect(),
            other => vec![other.to_string()],
        }
    }
}

impl From<ValidationError> for crate::Error {
    fn from(err: ValidationError) -> Self {
        crate::Error::Validation(err.messages())
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Accumulates validation failures across fields and sections.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `value` to lie in the closed range `[min, max]`.
    pub fn in_range(&mut self, field: &str, value: f64, min: f64, max: f64) -> &mut Self {
        if !value.is_finite() || value < min || value > max {
            self.errors.push(ValidationError::InvalidValue {
                field: field.into(),
                reason: format!("{} is outside [{}, {}]", value, min, max),
            });
        }
        self
    }

    /// Require `value` to be strictly positive.
    pub fn positive(&mut self, field: &str, value: f64) -> &mut Self {
        if !value.is_finite() || value <= 0.0 {
            self.errors.push(ValidationError::InvalidValue {
                field: field.into(),
                reason: format!("{} must be greater than 0", value),
            });
        }
        self
    }

    /// Require `value` to be zero or greater.
    pub fn non_negative(&mut self, field: &str, value: f64) -> &mut Self {
        if !value.is_finite() || value < 0.0 {
            self.errors.push(ValidationError::InvalidValue {
                field: field.into(),
                reason: format!("{} must not be negative", value),
            });
        }
        self
    }

    /// Record a failure when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, reason: impl Into<String>) -> &mut Self {
        if !ok {
            self.errors.push(ValidationError::InvalidValue {
                field: field.into(),
                reason: reason.into(),
            });
        }
        self
    }

    /// Record a cross-field conflict when `ok` is false.
    pub fn conflict(&mut self, ok: bool, reason: impl Into<String>) -> &mut Self {
        if !ok {
            self.errors.push(ValidationError::Conflict {
                reason: reason.into(),
            });
        }
        self
    }

    /// Validate a nested section and keep its failures.
    pub fn section(&mut self, section: &dyn Validate) -> &mut Self {
        if let Err(e) = section.validate() {
            match e {
                ValidationError::Multiple(errors) => self.errors.extend(errors),
                other => self.errors.push(other),
            }
        }
        self
    }

    pub fn finish(&mut self) -> ValidationResult<()> {
        let mut errors = std::mem::take(&mut self.errors);
        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Limits {
        size: f64,
        cap: f64,
    }

    impl Validate for Limits {
        fn validate(&self) -> ValidationResult<()> {
            Validator::new()
                .in_range("limits.size", self.size, 0.0, 1.0)
                .in_range("limits.cap", self.cap, 0.0, 1.0)
                .conflict(self.size <= self.cap, "size exceeds cap")
                .finish()
        }
    }

    #[test]
    fn test_valid_section() {
        assert!(Limits { size: 0.2, cap: 0.8 }.validate().is_ok());
    }

    #[test]
    fn test_single_error_is_not_wrapped() {
        let err = Limits { size: 0.9, cap: 0.8 }.validate().unwrap_err();
        assert!(matches!(err, ValidationError::Conflict { .. }));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let err = Limits { size: 1.5, cap: -1.0 }.validate().unwrap_err();
        assert_eq!(err.messages().len(), 3);
    }

    #[test]
    fn test_nan_is_rejected() {
        let err = Validator::new().positive("x", f64::NAN).finish().unwrap_err();
        assert!(err.to_string().contains("x"));
    }

    #[test]
    fn test_conversion_to_common_error() {
        let err: crate::Error = Limits { size: 1.5, cap: 0.8 }.validate().unwrap_err().into();
        assert!(err.is_validation());
    }
}
