use thiserror::Error;

use crate::util::SchemaError;

/// Structured error type for ddlstage library operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load definition: {message}")]
    Parse { message: String },

    #[error("Diff failed: {message}")]
    Diff {
        message: String,
        /// Fully-qualified name of the offending object, when known.
        object: Option<String>,
    },

    #[error("Invalid dependency order: {message}")]
    InvalidOrder { message: String },

    #[error("Failed to write output: {message}")]
    Output { message: String },
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn diff(message: impl Into<String>) -> Self {
        Self::Diff {
            message: message.into(),
            object: None,
        }
    }

    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Classify an error raised while diffing.
    pub(crate) fn from_diff(err: SchemaError) -> Self {
        match err {
            SchemaError::Definition { ref object, .. }
            | SchemaError::UnsupportedChange { ref object, .. } => Self::Diff {
                object: Some(object.clone()),
                message: err.to_string(),
            },
            SchemaError::InvalidOrder(message) => Self::InvalidOrder { message },
            SchemaError::ParseError(message) | SchemaError::IoError(message) => {
                Self::Parse { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_errors_keep_the_object() {
        let err = Error::from_diff(SchemaError::unsupported(
            "app.child",
            "inheritance changed from none to app.parent",
        ));
        match err {
            Error::Diff { object, message } => {
                assert_eq!(object.as_deref(), Some("app.child"));
                assert!(message.contains("inheritance changed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
