//! The client side of SASL: the mechanism contract, the registry that picks a mechanism
//! out of a server’s offer, and the driver that runs the exchange.

use std::error::Error as StdError;
use std::fmt;

use crate::common::Connection;
use crate::error::{ErrorKind, UsageError};

#[cfg(feature = "scram")]
use crate::common::scram::DeriveError;

/// The rank of a mechanism among those mutually offered, higher wins.
pub type Priority = i32;

/// Everything a mechanism can complain about while authenticating.
#[derive(Clone, Debug, PartialEq)]
pub enum MechanismError {
    /// ANONYMOUS was started with an identity configured.
    AnonymousRequiresNoCredentials,

    /// PLAIN needs a username.
    PlainRequiresUsername,
    /// PLAIN needs a password in plain text.
    PlainRequiresPlaintextPassword,

    /// OAUTHBEARER and X-OAUTH2 need a bearer token.
    OAuthRequiresToken,

    /// EXTERNAL needs the transport to carry the client’s identity.
    ExternalRequiresAuthenticatedChannel,

    /// The nonce source failed.
    #[cfg(feature = "scram")]
    CannotGenerateNonce(getrandom::Error),
    /// The nonce source returned something which can’t be sent.
    InvalidNonce,
    /// SCRAM needs a username.
    ScramRequiresUsername,
    /// SCRAM needs a password.
    ScramRequiresPassword,

    /// The challenge isn’t valid UTF-8 or isn’t a well-formed frame.
    CannotDecodeChallenge,
    /// The server sent a challenge this mechanism doesn’t expect at this point.
    UnexpectedChallenge,
    /// The exchange went on for more challenges than the driver allows.
    TooManyChallenges(usize),
    /// The server requires an extension this client doesn’t implement.
    UnsupportedExtension,
    /// The server reported an error inside the exchange.
    ServerError(String),
    /// The server-first message has no nonce.
    NoServerNonce,
    /// The server nonce doesn’t extend the client nonce.
    InvalidServerNonce,
    /// The server-first message has no usable salt.
    NoServerSalt,
    /// The server-first message has no usable iteration count.
    NoServerIterations,
    /// The salted password couldn’t be computed.
    #[cfg(feature = "scram")]
    DeriveError(DeriveError),
    /// The HMAC implementation refused a key.
    InvalidKeyLength,
    /// The mechanism isn’t in the right state for this call.
    InvalidState,

    /// The server declared success before the client sent any credential.
    SuccessBeforeFirstChallenge,
    /// The success data isn’t a well-formed frame.
    CannotDecodeSuccessResponse,
    /// The server signature doesn’t match, the server doesn’t know the password.
    InvalidSignatureInSuccessResponse,
    /// The server never proved it knows the password.
    NoSignatureInSuccessResponse,

    /// The session was driven in the wrong order.
    Usage(UsageError),
}

impl MechanismError {
    /// Returns the class of this error, either a usage error or a protocol violation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MechanismError::Usage(_) => ErrorKind::Usage,
            _ => ErrorKind::ProtocolViolation,
        }
    }
}

#[cfg(feature = "scram")]
impl From<DeriveError> for MechanismError {
    fn from(err: DeriveError) -> MechanismError {
        MechanismError::DeriveError(err)
    }
}

#[cfg(feature = "scram")]
impl From<hmac::digest::InvalidLength> for MechanismError {
    fn from(_err: hmac::digest::InvalidLength) -> MechanismError {
        MechanismError::InvalidKeyLength
    }
}

impl From<UsageError> for MechanismError {
    fn from(err: UsageError) -> MechanismError {
        MechanismError::Usage(err)
    }
}

impl fmt::Display for MechanismError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}",
            match self {
                MechanismError::AnonymousRequiresNoCredentials =>
                    "ANONYMOUS mechanism requires no credentials",

                MechanismError::PlainRequiresUsername => "PLAIN requires a username",
                MechanismError::PlainRequiresPlaintextPassword =>
                    "PLAIN requires a plaintext password",

                MechanismError::OAuthRequiresToken => "OAuth mechanisms require a bearer token",

                MechanismError::ExternalRequiresAuthenticatedChannel =>
                    "EXTERNAL requires an authenticated channel",

                #[cfg(feature = "scram")]
                MechanismError::CannotGenerateNonce(err) =>
                    return write!(fmt, "can't generate nonce: {}", err),
                MechanismError::InvalidNonce => "invalid client nonce",
                MechanismError::ScramRequiresUsername => "SCRAM requires a username",
                MechanismError::ScramRequiresPassword => "SCRAM requires a password",

                MechanismError::CannotDecodeChallenge => "can't decode challenge",
                MechanismError::UnexpectedChallenge => "unexpected challenge",
                MechanismError::TooManyChallenges(max) =>
                    return write!(fmt, "more than {} challenges", max),
                MechanismError::UnsupportedExtension => "unsupported mandatory extension",
                MechanismError::ServerError(err) => return write!(fmt, "server error: {}", err),
                MechanismError::NoServerNonce => "no server nonce",
                MechanismError::InvalidServerNonce => "server nonce doesn't extend ours",
                MechanismError::NoServerSalt => "no server salt",
                MechanismError::NoServerIterations => "no server iterations",
                #[cfg(feature = "scram")]
                MechanismError::DeriveError(err) => return write!(fmt, "derive error: {}", err),
                MechanismError::InvalidKeyLength => "invalid key length",
                MechanismError::InvalidState => "not in the right state to receive this response",

                MechanismError::SuccessBeforeFirstChallenge =>
                    "success before the first challenge was answered",
                MechanismError::CannotDecodeSuccessResponse => "can't decode success response",
                MechanismError::InvalidSignatureInSuccessResponse =>
                    "invalid signature in success response",
                MechanismError::NoSignatureInSuccessResponse => "no signature in success response",

                MechanismError::Usage(err) => return write!(fmt, "{}", err),
            }
        )
    }
}

impl StdError for MechanismError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(feature = "scram")]
            MechanismError::DeriveError(err) => Some(err),
            MechanismError::Usage(err) => Some(err),
            _ => None,
        }
    }
}

/// A trait which defines SASL mechanisms.
///
/// A `Mechanism` is reusable template data kept in a [`Registry`]; everything which
/// changes during one authentication attempt lives in the [`Exchange`] it returns from
/// [`on_start`](Mechanism::on_start).
pub trait Mechanism: Send + Sync {
    /// The name of the mechanism, exactly as servers advertise it.
    fn name(&self) -> &str;

    /// Whether the client sends the first message, before any server challenge.
    fn is_client_first(&self) -> bool;

    /// The default priority of this mechanism, a [`RegistryConfig`] can override it.
    fn priority(&self) -> Priority;

    /// Whether this mechanism can be attempted on this connection.
    ///
    /// Must not have side effects.
    fn test(&self, _connection: &dyn Connection) -> bool {
        true
    }

    /// Binds the mechanism to a new authentication attempt.
    fn on_start(&self, connection: &dyn Connection) -> Result<Box<dyn Exchange>, MechanismError>;
}

/// The per-attempt state of a mechanism.
pub trait Exchange: Send {
    /// Produces the next client message from the latest server challenge, `None` for
    /// the client’s first move.
    fn on_challenge(
        &mut self,
        connection: &dyn Connection,
        challenge: Option<&[u8]>,
    ) -> Result<Vec<u8>, MechanismError>;

    /// Verifies the additional data the server sent along with its success, if any.
    fn on_success(&mut self, _additional_data: Option<&[u8]>) -> Result<(), MechanismError> {
        Ok(())
    }

    /// The exchange was abandoned, drop whatever key material it holds.
    fn on_failure(&mut self) {}
}

mod driver;
pub mod mechanisms;
mod outcome;
mod registry;
mod session;
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
mod stream;

pub use self::driver::{Driver, Request, ServerEvent, State, Step};
pub use self::outcome::{DefinedCondition, Failure, Outcome, Reason, Stage};
pub use self::registry::{MechanismOverride, Registry, RegistryConfig};
pub use self::session::Session;
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub use self::stream::authenticate;
