use thiserror::Error;

/// Fatal conversion errors.
///
/// Anything recoverable (an expression that cannot be translated, a name
/// clash, a goto that must be reviewed) is reported as a
/// [`Diagnostic`](crate::diagnostics::Diagnostic) instead, and the command is
/// kept as it was. These variants abort the whole run because the input is
/// not a configuration the converter can reason about.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The command does not have the shape its handler expects.
    #[error("line {lineno}: {message}")]
    Structural { lineno: usize, message: String },
    /// A bind names a policy that was never added.
    #[error("policy {0} is not defined")]
    PolicyLookup(String),
    /// A bind priority is not a number.
    #[error("line {lineno}: invalid priority {value:?}")]
    InvalidPriority { lineno: usize, value: String },
    /// A translator pattern failed to compile.
    #[error("invalid translator pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ConvertError {
    pub fn structural(lineno: usize, message: impl Into<String>) -> Self {
        Self::Structural {
            lineno,
            message: message.into(),
        }
    }
}
