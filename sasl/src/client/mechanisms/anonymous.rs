//! Provides the SASL "ANONYMOUS" mechanism.

use crate::client::{Exchange, Mechanism, MechanismError, Priority};
use crate::common::{Connection, Identity};

/// A struct for the SASL ANONYMOUS mechanism.
#[derive(Clone, Copy, Debug, Default)]
pub struct Anonymous;

impl Anonymous {
    /// Constructs a new struct for authenticating using the SASL ANONYMOUS mechanism.
    pub fn new() -> Anonymous {
        Anonymous
    }
}

impl Mechanism for Anonymous {
    fn name(&self) -> &str {
        "ANONYMOUS"
    }

    fn is_client_first(&self) -> bool {
        false
    }

    fn priority(&self) -> Priority {
        20
    }

    fn test(&self, connection: &dyn Connection) -> bool {
        connection.credentials().identity == Identity::None
    }

    fn on_start(&self, connection: &dyn Connection) -> Result<Box<dyn Exchange>, MechanismError> {
        if !self.test(connection) {
            return Err(MechanismError::AnonymousRequiresNoCredentials);
        }
        Ok(Box::new(AnonymousExchange { answered: false }))
    }
}

struct AnonymousExchange {
    answered: bool,
}

impl Exchange for AnonymousExchange {
    fn on_challenge(
        &mut self,
        _connection: &dyn Connection,
        _challenge: Option<&[u8]>,
    ) -> Result<Vec<u8>, MechanismError> {
        if self.answered {
            return Err(MechanismError::UnexpectedChallenge);
        }
        self.answered = true;
        Ok(Vec::new())
    }
}
