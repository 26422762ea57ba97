use std::error::Error as StdError;
use std::fmt;

use crate::client::Failure;

/// An error caused by calling into this crate in the wrong order, or on the wrong
/// mechanism.
///
/// These never come from the server, a correct integration should never see them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageError {
    /// `client_challenge` was called on a mechanism where the server speaks first.
    ClientChallengeOnServerFirst(String),

    /// `client_challenge` was called a second time in the same session.
    ClientChallengeRepeated,

    /// A server challenge was fed to a client-first session before its initial response
    /// was produced.
    ChallengeBeforeClientChallenge,

    /// The session already released its connection, after a success or a failure.
    SessionReleased,

    /// Another session is still bound to the same connection.
    SessionAlreadyActive,

    /// The driver was asked to start while not idle.
    DriverAlreadyStarted,

    /// The driver was fed a server event before being started.
    DriverNotStarted,

    /// The driver was fed a server event after reaching a terminal state.
    DriverFinished,
}

impl fmt::Display for UsageError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UsageError::ClientChallengeOnServerFirst(mechanism) => write!(
                fmt,
                "client challenge requested from server-first mechanism {}",
                mechanism
            ),
            UsageError::ClientChallengeRepeated => {
                write!(fmt, "client challenge already produced in this session")
            }
            UsageError::ChallengeBeforeClientChallenge => {
                write!(fmt, "server challenge received before the client spoke first")
            }
            UsageError::SessionReleased => write!(fmt, "SASL session already released"),
            UsageError::SessionAlreadyActive => {
                write!(fmt, "another SASL session is active on this connection")
            }
            UsageError::DriverAlreadyStarted => write!(fmt, "authentication already started"),
            UsageError::DriverNotStarted => write!(fmt, "authentication not started yet"),
            UsageError::DriverFinished => write!(fmt, "authentication already finished"),
        }
    }
}

impl StdError for UsageError {}

/// An error while registering a mechanism.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The name isn’t a valid SASL mechanism name, that is 1 to 20 characters among
    /// `A-Z`, `0-9`, `-` and `_`.
    InvalidName(String),

    /// A mechanism with this name is already registered.
    Duplicate(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistryError::InvalidName(name) => {
                write!(fmt, "invalid SASL mechanism name {:?}", name)
            }
            RegistryError::Duplicate(name) => {
                write!(fmt, "SASL mechanism {} is already registered", name)
            }
        }
    }
}

impl StdError for RegistryError {}

/// No mechanism is both offered by the server and usable on this connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoCompatibleMechanism {
    /// The mechanisms the server advertised.
    pub offered: Vec<String>,
}

impl fmt::Display for NoCompatibleMechanism {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "no compatible SASL mechanism among [{}]",
            self.offered.join(", ")
        )
    }
}

impl StdError for NoCompatibleMechanism {}

/// The broad class of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Programming or integration error.
    Usage,
    /// A mechanism couldn’t be registered.
    Registry,
    /// Selection found nothing to attempt.
    NoCompatibleMechanism,
    /// The server sent something the mechanism can’t accept, or failed verification.
    ProtocolViolation,
    /// The server refused the authentication.
    CredentialRejected,
    /// The connection went away mid-exchange.
    Cancelled,
    /// The transport failed to carry a message.
    Transport,
}

/// A wrapper enum for things that could go wrong in this crate.
#[derive(Debug)]
pub enum Error {
    /// The API was misused.
    Usage(UsageError),

    /// A mechanism couldn’t be registered.
    Registry(RegistryError),

    /// Negotiation didn’t find any mechanism to attempt.
    NoCompatibleMechanism(NoCompatibleMechanism),

    /// A session was attempted and failed.
    Failed(Failure),

    /// The transport carrying the exchange failed.
    Transport(Box<dyn StdError + Send + Sync>),
}

impl Error {
    /// Returns the class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Usage(_) => ErrorKind::Usage,
            Error::Registry(_) => ErrorKind::Registry,
            Error::NoCompatibleMechanism(_) => ErrorKind::NoCompatibleMechanism,
            Error::Failed(failure) => failure.kind(),
            Error::Transport(_) => ErrorKind::Transport,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Usage(err) => write!(fmt, "usage error: {}", err),
            Error::Registry(err) => write!(fmt, "registry error: {}", err),
            Error::NoCompatibleMechanism(err) => write!(fmt, "{}", err),
            Error::Failed(failure) => write!(fmt, "authentication failed: {}", failure),
            Error::Transport(err) => write!(fmt, "transport error: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Usage(err) => Some(err),
            Error::Registry(err) => Some(err),
            Error::NoCompatibleMechanism(err) => Some(err),
            Error::Failed(failure) => Some(failure),
            Error::Transport(err) => Some(err.as_ref()),
        }
    }
}

impl From<UsageError> for Error {
    fn from(err: UsageError) -> Error {
        Error::Usage(err)
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Error {
        Error::Registry(err)
    }
}

impl From<NoCompatibleMechanism> for Error {
    fn from(err: NoCompatibleMechanism) -> Error {
        Error::NoCompatibleMechanism(err)
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Error {
        Error::Failed(failure)
    }
}
