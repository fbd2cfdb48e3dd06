//! Configuration for directory authentication clients.
//!
//! A [`DirectoryConfig`] is checked once by [`DirectoryConfig::validated`] before any
//! connection is attempted. Validation fails closed: a configuration missing the host, the base
//! DN or either service account credential is rejected outright.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;
use validator::Validate;

use crate::account::ServiceAccount;
use crate::{Error, Result};

/// Filter attribute used when none is configured (Active Directory login name).
pub const DEFAULT_FILTER_ATTRIBUTE: &str = "sAMAccountName";
/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 8;

const DEFAULT_SCHEME: &str = "ldap";

/// Connection and lookup settings for a directory.
#[derive(Debug, Deserialize, Validate)]
pub struct DirectoryConfig {
    /// Directory host and port (`ldap.example.com:389`) or an `ldap://` / `ldaps://` URL
    #[validate(length(min = 1, message = "directory host is required"))]
    pub host: String,

    /// Subtree under which users are searched, e.g. `dc=example,dc=com`
    #[validate(length(min = 1, message = "base DN is required"))]
    pub base_dn: String,

    /// Attribute matched against the username; blank means [`DEFAULT_FILTER_ATTRIBUTE`]
    #[serde(default)]
    pub filter: String,

    /// Account used for the initial read-only bind
    #[validate(nested)]
    pub service_account: ServiceAccount,

    /// Attributes returned by entry lookups
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Connection establishment timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Optional deadline in seconds covering a whole authentication attempt
    #[validate(range(min = 1, max = 3600))]
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to a PEM encoded CA certificate
    #[serde(default)]
    pub tls_ca_cert: Option<PathBuf>,

    /// Upgrade plain `ldap://` connections with StartTLS
    #[serde(default)]
    pub starttls: bool,
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_tls_verify() -> bool {
    true
}

impl DirectoryConfig {
    /// Create a configuration with the required parameters.
    ///
    /// Nothing is checked here; call [`DirectoryConfig::validated`] (clients do this on
    /// construction).
    ///
    /// # Arguments
    ///
    /// * `host` - Directory host and port, e.g. `ldap.forumsys.com:389`
    /// * `base_dn` - Search base, e.g. `dc=example,dc=com`
    /// * `service_account` - Credentials for the initial bind
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        service_account: ServiceAccount,
    ) -> Self {
        Self {
            host: host.into(),
            base_dn: base_dn.into(),
            filter: String::new(),
            service_account,
            attributes: Vec::new(),
            connection_timeout_secs: default_connection_timeout_secs(),
            operation_timeout_secs: None,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            starttls: false,
        }
    }

    /// Set the attribute matched against usernames (e.g. `uid`).
    #[must_use]
    pub fn with_filter(mut self, attribute: impl Into<String>) -> Self {
        self.filter = attribute.into();
        self
    }

    /// Set the attributes returned by entry lookups.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Set an overall deadline in seconds for each authentication attempt.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = Some(seconds);
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set custom CA certificate path.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Enable or disable StartTLS.
    #[must_use]
    pub const fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    /// Validates required fields and fills in defaults.
    ///
    /// The host is normalized to an `ldap://` URL when given as `host:port`, and a blank filter
    /// attribute becomes [`DEFAULT_FILTER_ATTRIBUTE`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] naming every missing or invalid field.
    pub fn validated(mut self) -> Result<Self> {
        self.host = self.host.trim().to_string();
        self.base_dn = self.base_dn.trim().to_string();
        self.service_account.name = self.service_account.name.trim().to_string();
        self.validate()?;

        self.host = normalize_host(&self.host)?;

        let filter = self.filter.trim();
        if filter.is_empty() {
            debug!(
                filter = DEFAULT_FILTER_ATTRIBUTE,
                "no filter attribute configured, using default"
            );
            self.filter = DEFAULT_FILTER_ATTRIBUTE.to_string();
        } else {
            self.filter = filter.to_string();
        }

        Ok(self)
    }

    /// Directory URL (normalized once validated).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.host
    }

    /// Search base distinguished name.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Attribute matched against usernames.
    #[must_use]
    pub fn filter_attribute(&self) -> &str {
        &self.filter
    }

    /// Service account credentials.
    #[must_use]
    pub const fn service_account(&self) -> &ServiceAccount {
        &self.service_account
    }

    /// Attributes returned by entry lookups.
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Get the connection timeout as a Duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Get the overall operation deadline, if one is configured.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns whether StartTLS is requested.
    #[must_use]
    pub const fn starttls(&self) -> bool {
        self.starttls
    }
}

fn normalize_host(host: &str) -> Result<String> {
    let candidate = if host.contains("://") {
        host.to_string()
    } else {
        format!("{DEFAULT_SCHEME}://{host}")
    };

    let url = Url::parse(&candidate)?;
    if !matches!(url.scheme(), "ldap" | "ldaps") {
        return Err(Error::InvalidConfiguration(format!(
            "unsupported directory scheme `{}`",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidConfiguration(format!(
            "directory host missing in `{host}`"
        )));
    }

    Ok(candidate)
}
