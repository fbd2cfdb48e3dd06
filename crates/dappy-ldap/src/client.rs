//! Directory authentication client.

use std::future::Future;
use std::sync::Arc;

use dappy_core::account::check_username;
use dappy_core::{Credentials, DirectoryConfig, Error, Result};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::entry::DirectoryEntry;
use crate::search::SearchRequest;
use crate::session::{Ldap3Connector, LdapConnector, LdapSession};

/// What a single call does once the service account is bound.
enum Operation<'a> {
    Probe,
    Authenticate { username: &'a str, password: &'a str },
    FetchEntry { username: &'a str },
}

/// Authenticates users with a service bind, a user search and a bind as the located user.
///
/// Every call opens its own session and releases it before returning, so a client can be shared
/// across tasks without locking.
pub struct DirectoryClient {
    config: Arc<DirectoryConfig>,
    connector: Box<dyn LdapConnector>,
}

impl DirectoryClient {
    /// Creates a client that uses the `ldap3` connector. No connection is opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the configuration is incomplete.
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        let config = Arc::new(config.validated()?);
        let connector: Box<dyn LdapConnector> = Box::new(Ldap3Connector::new(config.clone())?);
        Ok(Self { config, connector })
    }

    /// Creates a client with a caller-supplied connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the configuration is incomplete; the connector
    /// is not used in that case.
    pub fn with_connector(
        config: DirectoryConfig,
        connector: Box<dyn LdapConnector>,
    ) -> Result<Self> {
        Ok(Self {
            config: Arc::new(config.validated()?),
            connector,
        })
    }

    /// Creates a client and checks that the directory is reachable and accepts the service
    /// account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`], [`Error::ConnectionError`] or
    /// [`Error::ServiceBindFailed`].
    pub async fn connect(config: DirectoryConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.probe().await?;
        Ok(client)
    }

    /// Returns the validated configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Connects and binds with the service account, then releases the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionError`], [`Error::ServiceBindFailed`] or [`Error::Timeout`].
    #[instrument(level = "debug", skip(self))]
    pub async fn probe(&self) -> Result<()> {
        self.execute(Operation::Probe).await.map(|_| ())
    }

    /// Verifies `password` for the user whose filter attribute equals `username`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyUsername`] or [`Error::EmptyPassword`] without connecting,
    /// [`Error::UserNotFound`] when no entry matches, [`Error::InvalidCredentials`] when the
    /// directory rejects the password, and the connection, service bind, search or target bind
    /// error of whichever step failed otherwise.
    #[instrument(level = "debug", skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        Credentials::new(username, password).check()?;
        self.execute(Operation::Authenticate { username, password })
            .await
            .map(|_| ())
    }

    /// Looks up the entry for `username` with the configured attributes.
    ///
    /// No password is verified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyUsername`] without connecting, [`Error::UserNotFound`] when no entry
    /// matches, and the connection, service bind or search error of whichever step failed
    /// otherwise.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_entry(&self, username: &str) -> Result<DirectoryEntry> {
        check_username(username)?;
        self.execute(Operation::FetchEntry { username })
            .await?
            .ok_or_else(|| Error::UserNotFound(username.to_string()))
    }

    async fn execute(&self, operation: Operation<'_>) -> Result<Option<DirectoryEntry>> {
        let mut slot: Option<Box<dyn LdapSession>> = None;
        let outcome = self
            .within_deadline(async {
                let session = slot.insert(self.open_session().await?);
                self.run(&mut **session, &operation).await
            })
            .await;

        if let Some(session) = slot {
            self.release(session).await;
        }
        if let Err(err) = &outcome {
            if err.should_log() {
                warn!(code = err.error_code(), error = %err, "directory operation failed");
            }
        }
        outcome
    }

    async fn run(
        &self,
        session: &mut dyn LdapSession,
        operation: &Operation<'_>,
    ) -> Result<Option<DirectoryEntry>> {
        self.service_bind(session).await?;

        match *operation {
            Operation::Probe => Ok(None),
            Operation::Authenticate { username, password } => {
                let entry = self.lookup_user(session, username, &[]).await?;
                self.bind_as_user(session, &entry.dn, password).await?;
                Ok(None)
            }
            Operation::FetchEntry { username } => {
                let entry = self
                    .lookup_user(session, username, self.config.attributes())
                    .await?;
                Ok(Some(entry))
            }
        }
    }

    async fn open_session(&self) -> Result<Box<dyn LdapSession>> {
        self.connector
            .connect()
            .await
            .map_err(Error::ConnectionError)
    }

    async fn service_bind(&self, session: &mut dyn LdapSession) -> Result<()> {
        let account = self.config.service_account();
        session
            .simple_bind(account.bind_dn(), account.bind_password())
            .await
            .map_err(Error::ServiceBindFailed)?;
        debug!("service account bound");
        Ok(())
    }

    async fn lookup_user(
        &self,
        session: &mut dyn LdapSession,
        username: &str,
        attributes: &[String],
    ) -> Result<DirectoryEntry> {
        let request = SearchRequest::user_lookup(&self.config, username, attributes);
        let entries = session
            .search(&request)
            .await
            .map_err(Error::SearchError)?;

        if entries.len() > 1 {
            warn!(
                filter = %request.filter,
                matches = entries.len(),
                "user filter matched several entries, using the first"
            );
        }

        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::UserNotFound(username.to_string()))?;
        debug!(dn = %entry.dn, "user entry located");
        Ok(entry)
    }

    async fn bind_as_user(
        &self,
        session: &mut dyn LdapSession,
        dn: &str,
        password: &str,
    ) -> Result<()> {
        session.simple_bind(dn, password).await.map_err(|err| {
            if err.is_invalid_credentials() {
                Error::InvalidCredentials
            } else {
                Error::TargetBindError(err)
            }
        })
    }

    async fn release(&self, mut session: Box<dyn LdapSession>) {
        if let Err(err) = session.unbind().await {
            warn!(error = %err, "failed to unbind directory session");
        }
    }

    async fn within_deadline<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.operation_timeout() {
            Some(limit) => timeout(limit, fut).await.map_err(|_| {
                Error::Timeout(format!("directory operation exceeded {}s", limit.as_secs()))
            })?,
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::NO_ATTRIBUTES;
    use crate::session::{MockLdapConnector, MockLdapSession, ProtocolResult};
    use async_trait::async_trait;
    use dappy_core::{ProtocolError, ServiceAccount};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SERVICE_DN: &str = "cn=read-only-admin,dc=example,dc=com";
    const TESLA_DN: &str = "uid=tesla,dc=example,dc=com";

    fn sample_config() -> DirectoryConfig {
        DirectoryConfig::new(
            "ldap.forumsys.com:389",
            "dc=example,dc=com",
            ServiceAccount::new(SERVICE_DN, "password"),
        )
        .with_filter("uid")
    }

    fn tesla() -> DirectoryEntry {
        DirectoryEntry::new(TESLA_DN)
            .with_attribute("cn", ["Nikola Tesla"])
            .with_attribute("mail", ["tesla@ldap.forumsys.com"])
    }

    fn invalid_credentials() -> ProtocolError {
        ProtocolError::with_code(49, "Invalid Credentials")
    }

    fn connector_for(session: MockLdapSession) -> MockLdapConnector {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move || Ok(Box::new(session)));
        connector
    }

    fn unused_connector() -> MockLdapConnector {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().times(0);
        connector
    }

    fn client(session: MockLdapSession) -> DirectoryClient {
        DirectoryClient::with_connector(sample_config(), Box::new(connector_for(session))).unwrap()
    }

    #[tokio::test]
    async fn authenticate_success() {
        let mut sequence = mockall::Sequence::new();
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .withf(|dn, password| dn == SERVICE_DN && password == "password")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Ok(()));
        session
            .expect_search()
            .withf(|request| {
                request.filter == "(uid=tesla)" && request.attributes == [NO_ATTRIBUTES]
            })
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(vec![tesla()]));
        session
            .expect_simple_bind()
            .withf(|dn, password| dn == TESLA_DN && password == "password")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Ok(()));
        session
            .expect_unbind()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| Ok(()));

        let client = client(session);
        client.authenticate("tesla", "password").await.unwrap();
    }

    #[tokio::test]
    async fn authenticate_wrong_password() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .withf(|dn, _| dn == SERVICE_DN)
            .returning(|_, _| Ok(()));
        session
            .expect_search()
            .returning(|_| Ok(vec![tesla()]));
        session
            .expect_simple_bind()
            .withf(|dn, _| dn == TESLA_DN)
            .times(1)
            .returning(|_, _| Err(invalid_credentials()));
        session.expect_unbind().times(1).returning(|| Ok(()));

        let result = client(session).authenticate("tesla", "wrong").await;
        assert_eq!(result, Err(Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn authenticate_unknown_user() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .times(1)
            .returning(|_, _| Ok(()));
        session
            .expect_search()
            .returning(|_| Ok(Vec::new()));
        session.expect_unbind().times(1).returning(|| Ok(()));

        let result = client(session).authenticate("nouser", "x").await;
        assert_eq!(result, Err(Error::UserNotFound("nouser".to_string())));
    }

    #[tokio::test]
    async fn service_bind_failure_is_not_invalid_credentials() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .times(1)
            .returning(|_, _| Err(invalid_credentials()));
        session.expect_search().times(0);
        session.expect_unbind().times(1).returning(|| Ok(()));

        let result = client(session).authenticate("tesla", "password").await;
        assert_eq!(result, Err(Error::ServiceBindFailed(invalid_credentials())));
    }

    #[tokio::test]
    async fn search_failure_is_not_user_not_found() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        session
            .expect_search()
            .returning(|_| Err(ProtocolError::new("filter parse error")));
        session.expect_unbind().times(1).returning(|| Ok(()));

        let result = client(session).authenticate("tesla", "password").await;
        assert!(matches!(result, Err(Error::SearchError(_))));
    }

    #[tokio::test]
    async fn target_bind_transport_failure_passes_through() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .withf(|dn, _| dn == SERVICE_DN)
            .returning(|_, _| Ok(()));
        session
            .expect_search()
            .returning(|_| Ok(vec![tesla()]));
        session
            .expect_simple_bind()
            .withf(|dn, _| dn == TESLA_DN)
            .returning(|_, _| Err(ProtocolError::with_code(53, "Unwilling To Perform")));
        session.expect_unbind().times(1).returning(|| Ok(()));

        let result = client(session).authenticate("tesla", "password").await;
        assert_eq!(
            result,
            Err(Error::TargetBindError(ProtocolError::with_code(
                53,
                "Unwilling To Perform"
            )))
        );
    }

    #[tokio::test]
    async fn first_entry_wins_on_ambiguous_match() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .withf(|dn, _| dn == SERVICE_DN)
            .returning(|_, _| Ok(()));
        session.expect_search().returning(|_| {
            Ok(vec![
                tesla(),
                DirectoryEntry::new("uid=tesla,ou=archive,dc=example,dc=com"),
            ])
        });
        session
            .expect_simple_bind()
            .withf(|dn, _| dn == TESLA_DN)
            .times(1)
            .returning(|_, _| Ok(()));
        session.expect_unbind().times(1).returning(|| Ok(()));

        client(session)
            .authenticate("tesla", "password")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_fields_never_connect() {
        let client =
            DirectoryClient::with_connector(sample_config(), Box::new(unused_connector())).unwrap();

        assert_eq!(
            client.authenticate("", "password").await,
            Err(Error::EmptyUsername)
        );
        assert_eq!(
            client.authenticate("tesla", "").await,
            Err(Error::EmptyPassword)
        );
        assert_eq!(
            client.authenticate("", "").await,
            Err(Error::EmptyPassword)
        );
        assert_eq!(client.get_entry("").await, Err(Error::EmptyUsername));
    }

    #[tokio::test]
    async fn connection_failure_is_returned() {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|| Err(ProtocolError::new("Connection refused (os error 111)")));

        let client = DirectoryClient::with_connector(sample_config(), Box::new(connector)).unwrap();
        let result = client.authenticate("tesla", "password").await;
        assert!(matches!(result, Err(Error::ConnectionError(_))));
    }

    #[test]
    fn invalid_configuration_never_connects() {
        let config = DirectoryConfig::new("", "dc=example,dc=com", ServiceAccount::new("", "x"));
        let result = DirectoryClient::with_connector(config, Box::new(unused_connector()));
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn get_entry_returns_configured_attributes() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().times(1).returning(|_, _| Ok(()));
        session
            .expect_search()
            .withf(|request| request.attributes == ["cn", "mail"])
            .returning(|_| Ok(vec![tesla()]));
        session.expect_unbind().times(1).returning(|| Ok(()));

        let client = DirectoryClient::with_connector(
            sample_config().with_attributes(["cn", "mail"]),
            Box::new(connector_for(session)),
        )
        .unwrap();

        let entry = client.get_entry("tesla").await.unwrap();
        assert_eq!(entry.dn, TESLA_DN);
        assert_eq!(entry.first("cn"), Some("Nikola Tesla"));
        assert_eq!(entry.first("mail"), Some("tesla@ldap.forumsys.com"));
    }

    #[tokio::test]
    async fn get_entry_unknown_user() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().times(1).returning(|_, _| Ok(()));
        session.expect_search().returning(|_| Ok(Vec::new()));
        session.expect_unbind().times(1).returning(|| Ok(()));

        let result = client(session).get_entry("daddy").await;
        assert_eq!(result, Err(Error::UserNotFound("daddy".to_string())));
    }

    #[tokio::test]
    async fn probe_binds_and_releases() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .withf(|dn, password| dn == SERVICE_DN && password == "password")
            .times(1)
            .returning(|_, _| Ok(()));
        session.expect_search().times(0);
        session.expect_unbind().times(1).returning(|| Ok(()));

        client(session).probe().await.unwrap();
    }

    #[tokio::test]
    async fn unbind_failure_does_not_mask_outcome() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        session.expect_search().returning(|_| Ok(vec![tesla()]));
        session
            .expect_unbind()
            .times(1)
            .returning(|| Err(ProtocolError::new("broken pipe")));

        client(session)
            .authenticate("tesla", "password")
            .await
            .unwrap();
    }

    struct StalledSession {
        unbinds: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LdapSession for StalledSession {
        async fn simple_bind(&mut self, _dn: &str, _password: &str) -> ProtocolResult<()> {
            Ok(())
        }

        async fn search(&mut self, _request: &SearchRequest) -> ProtocolResult<Vec<DirectoryEntry>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn unbind(&mut self) -> ProtocolResult<()> {
            self.unbinds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn deadline_expires_and_session_is_released() {
        let unbinds = Arc::new(AtomicUsize::new(0));
        let session_unbinds = unbinds.clone();
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().times(1).return_once(move || {
            Ok(Box::new(StalledSession {
                unbinds: session_unbinds,
            }))
        });

        let client = DirectoryClient::with_connector(
            sample_config().with_operation_timeout_secs(1),
            Box::new(connector),
        )
        .unwrap();

        let result = client.authenticate("tesla", "password").await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(unbinds.load(Ordering::SeqCst), 1);
    }
}
