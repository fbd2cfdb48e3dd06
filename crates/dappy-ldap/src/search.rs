//! Search requests issued while locating a user.

use dappy_core::DirectoryConfig;
use ldap3::{DerefAliases, Scope};

/// Attribute list that asks the server to return no attributes (RFC 4511, section 4.5.1.8).
pub const NO_ATTRIBUTES: &str = "1.1";

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Alias dereferencing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefPolicy {
    /// Never dereference aliases.
    Never,
    /// Dereference while searching below the base.
    InSearching,
    /// Dereference when locating the base object.
    FindingBase,
    /// Always dereference.
    Always,
}

impl From<DerefPolicy> for DerefAliases {
    fn from(policy: DerefPolicy) -> Self {
        match policy {
            DerefPolicy::Never => DerefAliases::Never,
            DerefPolicy::InSearching => DerefAliases::Searching,
            DerefPolicy::FindingBase => DerefAliases::Finding,
            DerefPolicy::Always => DerefAliases::Always,
        }
    }
}

/// Parameters of a single LDAP search operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base.
    pub base_dn: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Alias dereferencing policy.
    pub deref: DerefPolicy,
    /// Maximum number of entries (0 means no client-imposed limit).
    pub size_limit: i32,
    /// Server-side time limit in seconds (0 means no client-imposed limit).
    pub time_limit: i32,
    /// Return attribute names only.
    pub types_only: bool,
    /// Search filter.
    pub filter: String,
    /// Requested attributes.
    pub attributes: Vec<String>,
}

impl SearchRequest {
    /// Builds the lookup for `username` under the configured base DN.
    ///
    /// Whole subtree, aliases never dereferenced, no limits. An empty `attributes` slice asks for
    /// no attributes at all.
    #[must_use]
    pub fn user_lookup(config: &DirectoryConfig, username: &str, attributes: &[String]) -> Self {
        let attributes = if attributes.is_empty() {
            vec![NO_ATTRIBUTES.to_string()]
        } else {
            attributes.to_vec()
        };

        Self {
            base_dn: config.base_dn().to_string(),
            scope: SearchScope::Subtree,
            deref: DerefPolicy::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: user_filter(config.filter_attribute(), username),
            attributes,
        }
    }
}

/// Builds `(<attribute>=<username>)`.
///
/// The username is escaped so it can only ever match a literal value; the attribute comes from
/// configuration and is inserted as is.
#[must_use]
pub fn user_filter(attribute: &str, username: &str) -> String {
    format!("({attribute}={})", escape_filter_value(username))
}

/// Escapes a value for use inside a search filter.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
