//! Provides the SASL "PLAIN" mechanism.

use crate::client::{Exchange, Mechanism, MechanismError, Priority};
use crate::common::Connection;

/// A struct for the SASL PLAIN mechanism.
///
/// The password is sent as is, this mechanism must only run over an encrypted stream.
/// The server speaks first, with an empty challenge.
#[derive(Clone, Copy, Debug, Default)]
pub struct Plain;

impl Plain {
    /// Constructs a new struct for authenticating using the SASL PLAIN mechanism.
    pub fn new() -> Plain {
        Plain
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn is_client_first(&self) -> bool {
        false
    }

    fn priority(&self) -> Priority {
        50
    }

    fn test(&self, connection: &dyn Connection) -> bool {
        let credentials = connection.credentials();
        credentials.username().is_some() && credentials.plain_password().is_some()
    }

    fn on_start(&self, connection: &dyn Connection) -> Result<Box<dyn Exchange>, MechanismError> {
        let credentials = connection.credentials();
        if credentials.username().is_none() {
            return Err(MechanismError::PlainRequiresUsername);
        }
        if credentials.plain_password().is_none() {
            return Err(MechanismError::PlainRequiresPlaintextPassword);
        }
        Ok(Box::new(PlainExchange { sent: false }))
    }
}

struct PlainExchange {
    sent: bool,
}

impl Exchange for PlainExchange {
    fn on_challenge(
        &mut self,
        connection: &dyn Connection,
        _challenge: Option<&[u8]>,
    ) -> Result<Vec<u8>, MechanismError> {
        if self.sent {
            return Err(MechanismError::UnexpectedChallenge);
        }
        let credentials = connection.credentials();
        let username = credentials
            .username()
            .ok_or(MechanismError::PlainRequiresUsername)?;
        let password = credentials
            .plain_password()
            .ok_or(MechanismError::PlainRequiresPlaintextPassword)?;

        let mut auth = Vec::new();
        if let Some(authzid) = connection.explicit_authzid() {
            auth.extend(authzid.bytes());
        }
        auth.push(0);
        auth.extend(username.bytes());
        auth.push(0);
        auth.extend(password.bytes());
        self.sent = true;
        Ok(auth)
    }
}
