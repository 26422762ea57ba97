//! Types shared by every mechanism: credentials, the connection seam, and the small
//! frame helpers SCRAM and OAUTHBEARER need.

use std::collections::HashMap;
use std::fmt;
use std::string::FromUtf8Error;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "scram")]
#[cfg_attr(docsrs, doc(cfg(feature = "scram")))]
pub mod scram;

/// The authentication identity requested by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    /// No identity, for anonymous logins or channel-level identities.
    None,
    /// The local part of the account, e.g. `juliet` for `juliet@capulet.lit`.
    Username(String),
}

impl From<String> for Identity {
    fn from(s: String) -> Identity {
        Identity::Username(s)
    }
}

impl<'a> From<&'a str> for Identity {
    fn from(s: &'a str) -> Identity {
        Identity::Username(s.to_owned())
    }
}

/// A struct containing SASL credentials.
///
/// Its `Debug` output never contains the secret.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// The requested identity.
    pub identity: Identity,
    /// The secret used to authenticate.
    pub secret: Secret,
    /// The identity to act as, when it differs from the authenticated one.
    pub authzid: Option<String>,
}

impl Default for Credentials {
    fn default() -> Credentials {
        Credentials {
            identity: Identity::None,
            secret: Secret::None,
            authzid: None,
        }
    }
}

impl Credentials {
    /// Creates a new Credentials with the specified username.
    pub fn with_username<N: Into<String>>(mut self, username: N) -> Credentials {
        self.identity = Identity::Username(username.into());
        self
    }

    /// Creates a new Credentials with the specified plaintext password.
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Credentials {
        self.secret = Secret::password_plain(password);
        self
    }

    /// Creates a new Credentials with the specified secret.
    pub fn with_secret(mut self, secret: Secret) -> Credentials {
        self.secret = secret;
        self
    }

    /// Creates a new Credentials with the specified OAuth 2.0 bearer token.
    pub fn with_token<T: Into<String>>(mut self, token: T) -> Credentials {
        self.secret = Secret::Token(token.into());
        self
    }

    /// Creates a new Credentials with the specified authorization identity.
    pub fn with_authzid<A: Into<String>>(mut self, authzid: A) -> Credentials {
        self.authzid = Some(authzid.into());
        self
    }

    /// The username, if any.
    pub fn username(&self) -> Option<&str> {
        match self.identity {
            Identity::Username(ref username) => Some(username),
            Identity::None => None,
        }
    }

    /// The password, in whichever form it was given.
    pub fn password(&self) -> Option<&Password> {
        match self.secret {
            Secret::Password(ref password) => Some(password),
            _ => None,
        }
    }

    /// The password, only if it was given in plain text.
    pub fn plain_password(&self) -> Option<&str> {
        match self.secret {
            Secret::Password(Password::Plain(ref password)) => Some(password),
            _ => None,
        }
    }

    /// The bearer token, if any.
    pub fn token(&self) -> Option<&str> {
        match self.secret {
            Secret::Token(ref token) => Some(token),
            _ => None,
        }
    }
}

/// Represents a SASL secret, like a password.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    /// No extra data needed.
    None,
    /// Password required.
    Password(Password),
    /// An OAuth 2.0 bearer token, obtained out-of-band.
    Token(String),
}

impl Secret {
    /// A plaintext password.
    pub fn password_plain<S: Into<String>>(password: S) -> Secret {
        Secret::Password(Password::Plain(password.into()))
    }

    /// A password already salted and hashed with PBKDF2, usable only with the matching
    /// SCRAM variant and server parameters.
    pub fn password_pbkdf2<S: Into<String>>(
        method: S,
        salt: Vec<u8>,
        iterations: u32,
        data: Vec<u8>,
    ) -> Secret {
        Secret::Password(Password::Pbkdf2 {
            method: method.into(),
            salt,
            iterations,
            data,
        })
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Secret::None => write!(fmt, "None"),
            Secret::Password(password) => write!(fmt, "Password({:?})", password),
            Secret::Token(_) => write!(fmt, "Token(..)"),
        }
    }
}

/// Represents a password.
#[derive(Clone, PartialEq, Eq)]
pub enum Password {
    /// A plaintext password.
    Plain(String),
    /// A password digest derived using PBKDF2.
    Pbkdf2 {
        /// The hash function name, e.g. `SHA-256`.
        method: String,
        /// The salt the digest was derived with.
        salt: Vec<u8>,
        /// The iteration count the digest was derived with.
        iterations: u32,
        /// The salted password itself.
        data: Vec<u8>,
    },
}

impl fmt::Debug for Password {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Password::Plain(_) => write!(fmt, "Plain(..)"),
            Password::Pbkdf2 {
                method, iterations, ..
            } => fmt
                .debug_struct("Pbkdf2")
                .field("method", method)
                .field("iterations", iterations)
                .finish_non_exhaustive(),
        }
    }
}

impl From<String> for Password {
    fn from(s: String) -> Password {
        Password::Plain(s)
    }
}

impl<'a> From<&'a str> for Password {
    fn from(s: &'a str) -> Password {
        Password::Plain(s.to_owned())
    }
}

/// Marks a connection as having a bound SASL session.
///
/// Cloning gives an unlocked lock: a copy of a connection is another connection.
#[derive(Debug, Default)]
pub struct SessionLock {
    active: AtomicBool,
}

impl SessionLock {
    /// Creates an unlocked lock.
    pub fn new() -> SessionLock {
        SessionLock::default()
    }

    /// Whether a session is currently bound.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn try_acquire(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Clone for SessionLock {
    fn clone(&self) -> SessionLock {
        SessionLock::new()
    }
}

/// What a mechanism may learn about the connection it authenticates.
///
/// A session borrows the connection for exactly its own lifetime, so an implementor
/// only needs to keep the credentials stable while an exchange is in flight. At most
/// one session is bound at a time, tracked through [`session_lock`](Connection::session_lock).
pub trait Connection: Send + Sync {
    /// The credentials to authenticate with.
    fn credentials(&self) -> &Credentials;

    /// The lock held by the session currently bound to this connection.
    fn session_lock(&self) -> &SessionLock;

    /// The domain of the server, e.g. `capulet.lit`.
    fn domain(&self) -> &str;

    /// Whether the transport already carries a verified client identity, for example
    /// through a TLS client certificate.
    fn is_channel_authenticated(&self) -> bool {
        false
    }

    /// The bare JID of the account, when a username is known.
    fn bare_jid(&self) -> Option<String> {
        self.credentials()
            .username()
            .map(|username| format!("{}@{}", username, self.domain()))
    }

    /// The authorization identity to send, if it isn’t implied by the authentication
    /// identity.
    fn explicit_authzid(&self) -> Option<&str> {
        let authzid = self.credentials().authzid.as_deref()?;
        match self.bare_jid() {
            Some(ref bare) if bare == authzid => None,
            _ => Some(authzid),
        }
    }
}

/// A plain [`Connection`], for clients which don’t need anything fancier.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    /// The domain of the server.
    pub domain: String,
    /// The credentials to authenticate with.
    pub credentials: Credentials,
    /// Whether the channel is already authenticated.
    pub channel_authenticated: bool,
    session_lock: SessionLock,
}

impl ConnectionInfo {
    /// Creates a new ConnectionInfo for the given domain and credentials.
    pub fn new<D: Into<String>>(domain: D, credentials: Credentials) -> ConnectionInfo {
        ConnectionInfo {
            domain: domain.into(),
            credentials,
            channel_authenticated: false,
            session_lock: SessionLock::new(),
        }
    }

    /// Marks the channel as carrying a verified client identity.
    pub fn with_authenticated_channel(mut self) -> ConnectionInfo {
        self.channel_authenticated = true;
        self
    }
}

impl Connection for ConnectionInfo {
    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn session_lock(&self) -> &SessionLock {
        &self.session_lock
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn is_channel_authenticated(&self) -> bool {
        self.channel_authenticated
    }
}

/// Escapes a saslname as per RFC 5802, `=` and `,` being the only special characters.
pub fn escape_saslname(name: &str) -> String {
    let mut ret = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '=' => ret.push_str("=3D"),
            ',' => ret.push_str("=2C"),
            c => ret.push(c),
        }
    }
    ret
}

#[doc(hidden)]
pub fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(a, b)| a ^ b).collect()
}

#[doc(hidden)]
pub fn parse_frame(frame: &[u8]) -> Result<HashMap<String, String>, FromUtf8Error> {
    let inner = String::from_utf8(frame.to_owned())?;
    let mut ret = HashMap::new();
    for s in inner.split(',') {
        let mut tmp = s.splitn(2, '=');
        let key = tmp.next();
        let val = tmp.next();
        if let (Some(k), Some(v)) = (key, val) {
            ret.insert(k.to_owned(), v.to_owned());
        }
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_works() {
        assert_eq!(
            xor(
                &[135, 94, 53, 134, 73, 233, 140, 221, 150, 12, 96, 111, 54, 66, 11, 76],
                &[163, 9, 122, 180, 107, 44, 22, 252, 248, 134, 112, 82, 84, 122, 56, 209]
            ),
            &[36, 87, 79, 50, 34, 197, 154, 33, 110, 138, 16, 61, 98, 56, 51, 157]
        );
    }

    #[test]
    fn parse_frame_keeps_padding() {
        let frame = parse_frame(b"r=abc,s=QSXCR+Q6sek8bf92==,i=4096").unwrap();
        assert_eq!(frame.get("r").unwrap(), "abc");
        assert_eq!(frame.get("s").unwrap(), "QSXCR+Q6sek8bf92==");
        assert_eq!(frame.get("i").unwrap(), "4096");
        assert!(parse_frame(b"r=\xff").is_err());
    }

    #[test]
    fn saslname_escaping() {
        assert_eq!(escape_saslname("user"), "user");
        assert_eq!(escape_saslname("a=b,c"), "a=3Db=2Cc");
    }

    #[test]
    fn debug_hides_secrets() {
        let creds = Credentials::default()
            .with_username("juliet")
            .with_password("r0m30myr0m30");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("juliet"));
        assert!(!debug.contains("r0m30myr0m30"));

        let creds = Credentials::default().with_token("ya29.vF9dft4qmTc2Nvb3RlckBhdHRhdmlzdGEuY29tCg");
        assert!(!format!("{:?}", creds).contains("ya29"));
    }

    #[test]
    fn authzid_implied_by_bare_jid() {
        let conn = ConnectionInfo::new(
            "capulet.lit",
            Credentials::default()
                .with_username("juliet")
                .with_password("pass")
                .with_authzid("juliet@capulet.lit"),
        );
        assert_eq!(conn.bare_jid().as_deref(), Some("juliet@capulet.lit"));
        assert_eq!(conn.explicit_authzid(), None);

        let conn = ConnectionInfo::new(
            "capulet.lit",
            Credentials::default()
                .with_username("nurse")
                .with_password("pass")
                .with_authzid("juliet@capulet.lit"),
        );
        assert_eq!(conn.explicit_authzid(), Some("juliet@capulet.lit"));
    }
}
