#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! This crate provides the client side of SASL authentication for XMPP: a few
//! authentication mechanisms, a registry picking the best one out of what a server
//! offers, and a driver running the challenge-response exchange.
//!
//! # Examples
//!
//! ```rust
//! use xmpp_sasl::client::mechanisms::Plain;
//! use xmpp_sasl::client::{Mechanism, Session};
//! use xmpp_sasl::common::{ConnectionInfo, Credentials};
//!
//! let creds = Credentials::default()
//!     .with_username("user")
//!     .with_password("pencil");
//! let conn = ConnectionInfo::new("example.com", creds);
//!
//! let mut session = Session::on_start(&Plain::new(), &conn).unwrap();
//! assert!(!session.is_client_first());
//!
//! let response = session.on_challenge(None).unwrap();
//! assert_eq!(response, b"\0user\0pencil");
//! session.on_success(None).unwrap();
//! ```
//!
//! See [`client::Driver`] to run a whole negotiation, and the tests of the SCRAM
//! mechanism for examples of more advanced usage.
//!
//! # Usage
//!
//! You can use this in your crate by adding this under `dependencies` in your `Cargo.toml`:
//!
//! ```toml,ignore
//! xmpp-sasl = "*"
//! ```

pub mod client;
pub mod common;
mod error;

pub use crate::error::{Error, ErrorKind, NoCompatibleMechanism, RegistryError, UsageError};
