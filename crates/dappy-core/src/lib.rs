//! # dappy-core
//!
//! Core types for authenticating users against an LDAP directory.
//!
//! This crate holds everything that does not touch the network: the error taxonomy, the
//! directory configuration and its validation, and the credential types.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and protocol error classification
//! - [`config`] - Directory configuration, defaults and validation
//! - [`account`] - Service account and per-attempt credentials

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod account;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use account::{Credentials, ServiceAccount};
pub use config::{DirectoryConfig, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_FILTER_ATTRIBUTE};
pub use error::{Error, ProtocolError, Result};
