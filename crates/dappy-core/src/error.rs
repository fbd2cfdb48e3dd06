//! Error types for directory authentication.
//!
//! Every failure of an authentication attempt maps to exactly one [`Error`] variant, so callers
//! can tell an unknown user apart from a wrong password or an unreachable directory.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

/// LDAP result code reported when a bind is rejected for bad credentials.
pub const INVALID_CREDENTIALS_RESULT_CODE: u32 = 49;

/// Failure reported by the directory-protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    code: Option<u32>,
    message: String,
}

impl ProtocolError {
    /// Creates a protocol error that carries no LDAP result code (transport or client failure).
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a protocol error from a non-success LDAP result.
    #[must_use]
    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// LDAP result code, when the server answered.
    #[must_use]
    pub const fn result_code(&self) -> Option<u32> {
        self.code
    }

    /// Diagnostic text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the server rejected the bind with `invalidCredentials`.
    #[must_use]
    pub fn is_invalid_credentials(&self) -> bool {
        self.code == Some(INVALID_CREDENTIALS_RESULT_CODE)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) if self.message.is_empty() => write!(f, "LDAP result code {code}"),
            Some(code) => write!(f, "LDAP result code {code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Main error type for directory authentication.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration is incomplete or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Username was empty
    #[error("Empty username")]
    EmptyUsername,

    /// Password was empty
    #[error("Empty password")]
    EmptyPassword,

    /// Directory could not be reached
    #[error("Could not connect to directory: {0}")]
    ConnectionError(ProtocolError),

    /// Service account bind was rejected
    #[error("Could not perform service account bind: {0}")]
    ServiceBindFailed(ProtocolError),

    /// Search request failed
    #[error("Directory search failed: {0}")]
    SearchError(ProtocolError),

    /// No entry matched the filter
    #[error("User `{0}` not found in directory")]
    UserNotFound(String),

    /// Password did not match
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Bind as the located user failed for a reason other than bad credentials
    #[error("Could not bind as user: {0}")]
    TargetBindError(ProtocolError),

    /// Overall operation deadline expired
    #[error("Timeout waiting for directory: {0}")]
    Timeout(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::EmptyUsername => "EMPTY_USERNAME",
            Self::EmptyPassword => "EMPTY_PASSWORD",
            Self::ConnectionError(_) => "CONNECTION_ERROR",
            Self::ServiceBindFailed(_) => "SERVICE_BIND_FAILED",
            Self::SearchError(_) => "SEARCH_ERROR",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TargetBindError(_) => "TARGET_BIND_ERROR",
            Self::Timeout(_) => "TIMEOUT",
        }
    }

    /// Returns true if this error points at the deployment rather than the end user.
    ///
    /// Bad passwords and unknown users are routine; a failing service bind or an unreachable
    /// directory needs an operator.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_)
                | Self::ConnectionError(_)
                | Self::ServiceBindFailed(_)
                | Self::SearchError(_)
                | Self::TargetBindError(_)
                | Self::Timeout(_)
        )
    }

    /// Returns true if the caller supplied credentials that were rejected or unknown.
    #[must_use]
    pub const fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::EmptyUsername
                | Self::EmptyPassword
                | Self::UserNotFound(_)
                | Self::InvalidCredentials
        )
    }
}

impl From<ValidationErrors> for Error {
    fn from(err: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        collect_fields(&err, None, &mut fields);
        fields.sort();
        fields.dedup();
        Self::InvalidConfiguration(format!("missing or invalid fields: {}", fields.join(", ")))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidConfiguration(format!("invalid host: {err}"))
    }
}

fn collect_fields(errors: &ValidationErrors, prefix: Option<&str>, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path: Cow<'_, str> = match prefix {
            Some(prefix) => Cow::Owned(format!("{prefix}.{field}")),
            None => Cow::Borrowed(field.as_ref()),
        };
        match kind {
            ValidationErrorsKind::Field(_) => out.push(path.into_owned()),
            ValidationErrorsKind::Struct(nested) => collect_fields(nested, Some(path.as_ref()), out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    let item = format!("{path}[{index}]");
                    collect_fields(nested, Some(item.as_str()), out);
                }
            }
        }
    }
}
