use std::error::Error as StdError;
use std::fmt;

use crate::client::MechanismError;
use crate::error::{Error, ErrorKind, NoCompatibleMechanism};

/// The failure conditions a server may send, from RFC 6120 §6.5.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DefinedCondition {
    /// The client aborted the exchange.
    Aborted,
    /// The account has been disabled.
    AccountDisabled,
    /// The credentials for this account have expired.
    CredentialsExpired,
    /// The mechanism needs an encrypted stream.
    EncryptionRequired,
    /// The base64 data sent by the client is invalid.
    IncorrectEncoding,
    /// The authzid provided by the client is invalid.
    InvalidAuthzid,
    /// The client tried to use an invalid mechanism.
    InvalidMechanism,
    /// The client sent a bad request.
    MalformedRequest,
    /// The mechanism is weaker than what the server allows.
    MechanismTooWeak,
    /// The credentials provided are invalid.
    NotAuthorized,
    /// The server encountered a temporary issue, retrying later may work.
    TemporaryAuthFailure,
    /// A condition this crate doesn’t know about.
    Other(String),
}

impl DefinedCondition {
    /// The element name of this condition.
    pub fn as_str(&self) -> &str {
        match self {
            DefinedCondition::Aborted => "aborted",
            DefinedCondition::AccountDisabled => "account-disabled",
            DefinedCondition::CredentialsExpired => "credentials-expired",
            DefinedCondition::EncryptionRequired => "encryption-required",
            DefinedCondition::IncorrectEncoding => "incorrect-encoding",
            DefinedCondition::InvalidAuthzid => "invalid-authzid",
            DefinedCondition::InvalidMechanism => "invalid-mechanism",
            DefinedCondition::MalformedRequest => "malformed-request",
            DefinedCondition::MechanismTooWeak => "mechanism-too-weak",
            DefinedCondition::NotAuthorized => "not-authorized",
            DefinedCondition::TemporaryAuthFailure => "temporary-auth-failure",
            DefinedCondition::Other(other) => other,
        }
    }
}

impl<'a> From<&'a str> for DefinedCondition {
    fn from(s: &'a str) -> DefinedCondition {
        match s {
            "aborted" => DefinedCondition::Aborted,
            "account-disabled" => DefinedCondition::AccountDisabled,
            "credentials-expired" => DefinedCondition::CredentialsExpired,
            "encryption-required" => DefinedCondition::EncryptionRequired,
            "incorrect-encoding" => DefinedCondition::IncorrectEncoding,
            "invalid-authzid" => DefinedCondition::InvalidAuthzid,
            "invalid-mechanism" => DefinedCondition::InvalidMechanism,
            "malformed-request" => DefinedCondition::MalformedRequest,
            "mechanism-too-weak" => DefinedCondition::MechanismTooWeak,
            "not-authorized" => DefinedCondition::NotAuthorized,
            "temporary-auth-failure" => DefinedCondition::TemporaryAuthFailure,
            other => DefinedCondition::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for DefinedCondition {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// How far an exchange got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Binding the mechanism to the connection, up to the first challenge of a
    /// server-first mechanism.
    Start,
    /// The client’s first move, before any challenge has been answered.
    InitialResponse,
    /// Answering the n-th server challenge, starting at 1.
    Challenge {
        /// The number of the challenge.
        round: usize,
    },
    /// Verifying the server’s success data.
    Success,
}

impl fmt::Display for Stage {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Start => write!(fmt, "start"),
            Stage::InitialResponse => write!(fmt, "initial response"),
            Stage::Challenge { round } => write!(fmt, "challenge {}", round),
            Stage::Success => write!(fmt, "success"),
        }
    }
}

/// Why a session failed.
#[derive(Clone, Debug, PartialEq)]
pub enum Reason {
    /// The mechanism refused what the server sent, or couldn’t produce a response.
    ProtocolViolation(MechanismError),
    /// The server refused the authentication.
    CredentialRejected {
        /// The condition the server sent.
        condition: DefinedCondition,
        /// The human-readable text the server sent along, if any.
        text: Option<String>,
    },
    /// The connection went away mid-exchange.
    Cancelled,
}

/// A failed session, with enough context to log it or retry with another mechanism.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    /// The mechanism which failed, `None` if the connection went away before selection.
    pub mechanism: Option<String>,
    /// How far the exchange got.
    pub stage: Stage,
    /// Why it failed.
    pub reason: Reason,
}

impl Failure {
    /// A short condition string for diagnostics.
    pub fn condition(&self) -> String {
        match self.reason {
            Reason::ProtocolViolation(ref err) => err.to_string(),
            Reason::CredentialRejected { ref condition, .. } => condition.to_string(),
            Reason::Cancelled => "cancelled".to_owned(),
        }
    }

    /// Returns the class of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self.reason {
            Reason::ProtocolViolation(ref err) => err.kind(),
            Reason::CredentialRejected { .. } => ErrorKind::CredentialRejected,
            Reason::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mechanism = self.mechanism.as_deref().unwrap_or("no mechanism");
        match self.reason {
            Reason::ProtocolViolation(ref err) => {
                write!(fmt, "{} failed at {}: {}", mechanism, self.stage, err)
            }
            Reason::CredentialRejected {
                ref condition,
                text: Some(ref text),
            } => write!(
                fmt,
                "{} rejected at {}: {} ({})",
                mechanism, self.stage, condition, text
            ),
            Reason::CredentialRejected {
                ref condition,
                text: None,
            } => write!(fmt, "{} rejected at {}: {}", mechanism, self.stage, condition),
            Reason::Cancelled => write!(fmt, "{} cancelled at {}", mechanism, self.stage),
        }
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self.reason {
            Reason::ProtocolViolation(ref err) => Some(err),
            _ => None,
        }
    }
}

/// The single terminal result of a negotiation.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The server accepted the authentication, and the mechanism verified the server.
    Succeeded {
        /// The mechanism which succeeded.
        mechanism: String,
    },
    /// A session was attempted and failed.
    Failed(Failure),
    /// Nothing was attempted, the server offered nothing usable.
    NoCompatibleMechanism(NoCompatibleMechanism),
}

impl Outcome {
    /// Whether the negotiation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    /// The mechanism attempted, if any.
    pub fn mechanism(&self) -> Option<&str> {
        match self {
            Outcome::Succeeded { mechanism } => Some(mechanism),
            Outcome::Failed(failure) => failure.mechanism.as_deref(),
            Outcome::NoCompatibleMechanism(_) => None,
        }
    }

    /// Converts to a `Result` holding the name of the successful mechanism.
    pub fn into_result(self) -> Result<String, Error> {
        match self {
            Outcome::Succeeded { mechanism } => Ok(mechanism),
            Outcome::Failed(failure) => Err(Error::Failed(failure)),
            Outcome::NoCompatibleMechanism(err) => Err(Error::NoCompatibleMechanism(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_round_trip_through_names() {
        for name in [
            "aborted",
            "account-disabled",
            "credentials-expired",
            "encryption-required",
            "incorrect-encoding",
            "invalid-authzid",
            "invalid-mechanism",
            "malformed-request",
            "mechanism-too-weak",
            "not-authorized",
            "temporary-auth-failure",
        ] {
            let condition = DefinedCondition::from(name);
            assert!(!matches!(condition, DefinedCondition::Other(_)));
            assert_eq!(condition.as_str(), name);
        }
        assert_eq!(
            DefinedCondition::from("policy-violation"),
            DefinedCondition::Other("policy-violation".to_owned())
        );
    }

    #[test]
    fn failure_kinds() {
        let rejected = Failure {
            mechanism: Some("PLAIN".to_owned()),
            stage: Stage::Challenge { round: 1 },
            reason: Reason::CredentialRejected {
                condition: DefinedCondition::NotAuthorized,
                text: Some("Wrong password".to_owned()),
            },
        };
        assert_eq!(rejected.kind(), ErrorKind::CredentialRejected);
        assert_eq!(rejected.condition(), "not-authorized");
        assert_eq!(
            rejected.to_string(),
            "PLAIN rejected at challenge 1: not-authorized (Wrong password)"
        );

        let violation = Failure {
            mechanism: Some("SCRAM-SHA-1".to_owned()),
            stage: Stage::Success,
            reason: Reason::ProtocolViolation(MechanismError::InvalidSignatureInSuccessResponse),
        };
        assert_eq!(violation.kind(), ErrorKind::ProtocolViolation);
        assert_eq!(
            Error::Failed(violation).kind(),
            ErrorKind::ProtocolViolation
        );
    }
}
