//! Connection factory and session seam over the directory-protocol client.
//!
//! [`LdapConnector`] opens one [`LdapSession`] per call. The production implementation is
//! backed by `ldap3`; tests plug in their own.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use dappy_core::{DirectoryConfig, Error, ProtocolError, Result};
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, SearchEntry, SearchOptions};
use native_tls::{Certificate, TlsConnector};
use tracing::debug;

use crate::entry::DirectoryEntry;
use crate::search::SearchRequest;

/// Result of a directory-protocol operation.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// An open connection to the directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Binds with a DN and password.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> ProtocolResult<()>;

    /// Runs a search and returns the matched entries in server order.
    async fn search(&mut self, request: &SearchRequest) -> ProtocolResult<Vec<DirectoryEntry>>;

    /// Closes the connection.
    async fn unbind(&mut self) -> ProtocolResult<()>;
}

/// Opens directory sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Opens a new session, bounded by the connection timeout.
    async fn connect(&self) -> ProtocolResult<Box<dyn LdapSession>>;
}

/// Connector backed by `ldap3`.
pub(crate) struct Ldap3Connector {
    config: Arc<DirectoryConfig>,
    settings: LdapConnSettings,
}

impl Ldap3Connector {
    /// Creates a connector for a configuration that has already passed
    /// [`DirectoryConfig::validated`], so its URL is normalized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the TLS settings cannot be applied (for
    /// example an unreadable CA certificate).
    pub(crate) fn new(config: Arc<DirectoryConfig>) -> Result<Self> {
        let settings = build_ldap_settings(&config)?;
        Ok(Self { config, settings })
    }
}

#[async_trait]
impl LdapConnector for Ldap3Connector {
    async fn connect(&self) -> ProtocolResult<Box<dyn LdapSession>> {
        debug!(url = self.config.url(), "connecting to directory");
        let (conn, ldap) = LdapConnAsync::with_settings(self.settings.clone(), self.config.url())
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        Ok(Box::new(Ldap3Session { inner: ldap }))
    }
}

struct Ldap3Session {
    inner: ldap3::Ldap,
}

#[async_trait]
impl LdapSession for Ldap3Session {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> ProtocolResult<()> {
        self.inner
            .simple_bind(dn, password)
            .await
            .map_err(map_ldap_error)?
            .success()
            .map_err(map_ldap_error)?;
        Ok(())
    }

    async fn search(&mut self, request: &SearchRequest) -> ProtocolResult<Vec<DirectoryEntry>> {
        let options = SearchOptions::new()
            .deref(request.deref.into())
            .sizelimit(request.size_limit)
            .timelimit(request.time_limit)
            .typesonly(request.types_only);

        let result = self
            .inner
            .with_search_options(options)
            .search(
                &request.base_dn,
                request.scope.into(),
                &request.filter,
                request.attributes.clone(),
            )
            .await
            .map_err(map_ldap_error)?;
        let (entries, _) = result.success().map_err(map_ldap_error)?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(DirectoryEntry::from)
            .collect())
    }

    async fn unbind(&mut self) -> ProtocolResult<()> {
        self.inner.unbind().await.map_err(map_ldap_error)
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs,
            binary_attributes: entry.bin_attrs,
        }
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(config.connection_timeout())
        .set_starttls(config.starttls());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::InvalidConfiguration(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::InvalidConfiguration(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|err| {
            Error::InvalidConfiguration(format!("invalid directory CA certificate: {err}"))
        })?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::InvalidConfiguration(format!(
                    "failed to load directory CA certificate: {err}"
                ))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

/// Keeps the LDAP result code so callers can tell a rejected password from a broken transport.
fn map_ldap_error(err: LdapError) -> ProtocolError {
    match err {
        LdapError::LdapResult { result } => ProtocolError::with_code(result.rc, result.text),
        other => ProtocolError::new(other.to_string()),
    }
}
