//! Hand-rolled boundary validation
//!
//! Every public input is checked explicitly at the boundary; failures carry
//! the offending field path so callers can repair the request. Runtime
//! schema libraries are deliberately not used: the set of recognized
//! options is closed, which keeps `inputs_hash` stable across versions.

use serde::Serialize;

/// A single rejected field.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path to the field, e.g. `config.concurrency` or `tests[2].prompt`
    pub path: String,
    pub message: String,
}

/// Aggregate of everything wrong with one input.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                path: path.into(),
                message: message.into(),
            }],
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.path, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Collects field errors while walking an input structure.
///
/// ```
/// use modelbench_core::validate::Validator;
///
/// let mut v = Validator::new();
/// v.require(false, "prompt", "must not be empty");
/// assert!(v.finish().is_err());
/// ```
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error at `path` unless `ok` holds.
    pub fn require(&mut self, ok: bool, path: impl Into<String>, message: impl Into<String>) {
        if !ok {
            self.errors.push(FieldError {
                path: path.into(),
                message: message.into(),
            });
        }
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Merge errors from a nested structure under a path prefix.
    pub fn nested(&mut self, prefix: &str, result: Result<(), ValidationError>) {
        if let Err(err) = result {
            for e in err.errors {
                self.errors.push(FieldError {
                    path: format!("{}.{}", prefix, e.path),
                    message: e.message,
                });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_validator_passes() {
        assert!(Validator::new().finish().is_ok());
    }

    #[test]
    fn require_records_path_and_message() {
        let mut v = Validator::new();
        v.require(true, "a", "ignored");
        v.require(false, "config.concurrency", "must be >= 1");
        let err = v.finish().unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].path, "config.concurrency");
        assert!(err.to_string().contains("config.concurrency"));
    }

    #[test]
    fn nested_prefixes_paths() {
        let inner = Err(ValidationError::single("prompt", "must not be empty"));
        let mut v = Validator::new();
        v.nested("tests[0]", inner);
        let err = v.finish().unwrap_err();
        assert_eq!(err.errors[0].path, "tests[0].prompt");
    }
}
