//! Document-level error types.
//!
//! [`DocumentError`] is recoverable: the owning tracker logs it and skips the
//! file. [`EvalError`] aborts the whole build cycle.

use std::path::PathBuf;
use thiserror::Error;

/// Problems with a single source file.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("`{path}`: {reason}")]
    InvalidSyntax { path: String, reason: &'static str },

    #[error("`{path}`: invalid front matter: {message}")]
    FrontMatter { path: String, message: String },

    #[error("`{path}`: malformed data: {message}")]
    Payload { path: String, message: String },

    #[error("`{path}`: no deserializer for `.{extension}` files")]
    UnsupportedDataType { path: String, extension: String },

    #[error("`{path}`: {feature} support is not available; {remediation}")]
    DependencyMissing {
        path: String,
        feature: &'static str,
        remediation: &'static str,
    },

    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),
}

impl DocumentError {
    pub(crate) fn invalid(path: &str, reason: &'static str) -> Self {
        Self::InvalidSyntax {
            path: path.to_string(),
            reason,
        }
    }

    pub(crate) fn payload(path: &str, message: impl ToString) -> Self {
        Self::Payload {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn front_matter(path: &str, message: impl ToString) -> Self {
        Self::FrontMatter {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

/// Front matter variable resolution failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("`{path}`: undefined variable `%{name}`")]
    UndefinedVariable { name: String, path: String },

    #[error("`{path}`: variable `%{name}` is bound to a list or mapping and cannot be substituted")]
    NonScalarVariable { name: String, path: String },

    #[error("`{path}`: variable `%{name}` refers to itself")]
    CyclicVariable { name: String, path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_variable_names_path_and_variable() {
        let err = EvalError::UndefinedVariable {
            name: "missing".into(),
            path: "_posts/a.md".into(),
        };
        let display = format!("{err}");
        assert!(display.contains("%missing"));
        assert!(display.contains("_posts/a.md"));
    }

    #[test]
    fn test_dependency_missing_has_remediation() {
        let err = DocumentError::DependencyMissing {
            path: "_data/feed.xml".into(),
            feature: "XML",
            remediation: "convert the file to YAML, JSON or TOML",
        };
        assert!(format!("{err}").contains("convert the file"));
    }
}
