//! Service account and end-user credential types.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{Error, Result};

/// Read-only account used for the initial bind before the end user is located.
///
/// Both fields are required; a blank name or an empty password fails validation.
#[derive(Debug, Deserialize)]
pub struct ServiceAccount {
    /// Bind DN (or bind name accepted by the directory) of the service account
    pub name: String,

    /// Service account password
    pub password: SecretString,
}

impl ServiceAccount {
    /// Create a new service account.
    ///
    /// # Arguments
    ///
    /// * `name` - Bind DN of the service account, e.g. `cn=read-only-admin,dc=example,dc=com`
    /// * `password` - The service account password
    #[must_use]
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Get the bind DN.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.name
    }

    /// Get the bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.password.expose_secret()
    }
}

// `SecretString` is not `Serialize`, so the derive cannot run a custom validator on it.
impl Validate for ServiceAccount {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", required("service account name is required"));
        }
        if self.password.expose_secret().is_empty() {
            errors.add("password", required("service account password is required"));
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn required(message: &'static str) -> ValidationError {
    ValidationError::new("required").with_message(message.into())
}

/// Username and password presented for a single authentication attempt.
///
/// Borrowed for the duration of one call and never stored.
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> Credentials<'a> {
    /// Pairs a username with the password to verify.
    #[must_use]
    pub const fn new(username: &'a str, password: &'a str) -> Self {
        Self { username, password }
    }

    /// Login name matched against the filter attribute.
    #[must_use]
    pub const fn username(&self) -> &'a str {
        self.username
    }

    /// Password to bind with once the user entry is found.
    #[must_use]
    pub const fn password(&self) -> &'a str {
        self.password
    }

    /// Rejects empty fields before any connection is opened.
    ///
    /// The password is checked first, so a call with both fields empty reports
    /// [`Error::EmptyPassword`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPassword`] or [`Error::EmptyUsername`].
    pub fn check(&self) -> Result<()> {
        if self.password.is_empty() {
            return Err(Error::EmptyPassword);
        }
        check_username(self.username)
    }
}

impl fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Rejects an empty username.
///
/// # Errors
///
/// Returns [`Error::EmptyUsername`] when `username` is empty.
pub fn check_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(Error::EmptyUsername);
    }
    Ok(())
}
