//! LDAP authentication client.
//!
//! [`DirectoryClient`] verifies a username and password with the bind/search/bind sequence:
//! bind as a read-only service account, search for the user's entry by a configurable
//! attribute, then bind as that entry with the supplied password. Each failure maps to one
//! [`Error`] variant.
//!
//! ```no_run
//! use dappy_ldap::{DirectoryClient, DirectoryConfig, ServiceAccount};
//!
//! # async fn run() -> dappy_ldap::Result<()> {
//! let config = DirectoryConfig::new(
//!     "ldap.forumsys.com:389",
//!     "dc=example,dc=com",
//!     ServiceAccount::new("cn=read-only-admin,dc=example,dc=com", "password"),
//! )
//! .with_filter("uid");
//!
//! let client = DirectoryClient::connect(config).await?;
//! client.authenticate("tesla", "password").await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod client;
mod entry;
mod search;
mod session;

pub use client::DirectoryClient;
pub use entry::DirectoryEntry;
pub use search::{
    escape_filter_value, user_filter, DerefPolicy, SearchRequest, SearchScope, NO_ATTRIBUTES,
};
pub use session::{LdapConnector, LdapSession, ProtocolResult};

pub use dappy_core::{
    Credentials, DirectoryConfig, Error, ProtocolError, Result, ServiceAccount,
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_FILTER_ATTRIBUTE,
};
