//! Provides the SASL "OAUTHBEARER" mechanism, from RFC 7628.

use crate::client::{Exchange, Mechanism, MechanismError, Priority};
use crate::common::{escape_saslname, Connection};

/// A struct for the SASL OAUTHBEARER mechanism.
#[derive(Clone, Copy, Debug, Default)]
pub struct OAuthBearer;

impl OAuthBearer {
    /// Constructs a new struct for authenticating using the SASL OAUTHBEARER mechanism.
    pub fn new() -> OAuthBearer {
        OAuthBearer
    }
}

impl Mechanism for OAuthBearer {
    fn name(&self) -> &str {
        "OAUTHBEARER"
    }

    fn is_client_first(&self) -> bool {
        true
    }

    fn priority(&self) -> Priority {
        40
    }

    fn test(&self, connection: &dyn Connection) -> bool {
        connection.credentials().token().is_some()
    }

    fn on_start(&self, connection: &dyn Connection) -> Result<Box<dyn Exchange>, MechanismError> {
        if !self.test(connection) {
            return Err(MechanismError::OAuthRequiresToken);
        }
        Ok(Box::new(OAuthBearerExchange {
            state: OAuthBearerState::Init,
        }))
    }
}

enum OAuthBearerState {
    Init,
    SentToken,
    AcknowledgedError,
}

struct OAuthBearerExchange {
    state: OAuthBearerState,
}

impl Exchange for OAuthBearerExchange {
    fn on_challenge(
        &mut self,
        connection: &dyn Connection,
        _challenge: Option<&[u8]>,
    ) -> Result<Vec<u8>, MechanismError> {
        match self.state {
            OAuthBearerState::Init => {
                let credentials = connection.credentials();
                let token = credentials
                    .token()
                    .ok_or(MechanismError::OAuthRequiresToken)?;
                let authzid = match credentials.authzid {
                    Some(ref authzid) => Some(authzid.clone()),
                    None => connection.bare_jid(),
                };

                let mut auth = Vec::new();
                auth.extend(b"n,");
                if let Some(authzid) = authzid {
                    auth.extend(b"a=");
                    auth.extend(escape_saslname(&authzid).bytes());
                }
                auth.extend(b",\x01auth=Bearer ");
                auth.extend(token.bytes());
                auth.extend(b"\x01\x01");
                self.state = OAuthBearerState::SentToken;
                Ok(auth)
            }
            // The server describes its error in a JSON challenge, and waits for a dummy
            // response before sending its failure.
            OAuthBearerState::SentToken => {
                self.state = OAuthBearerState::AcknowledgedError;
                Ok(vec![0x01])
            }
            OAuthBearerState::AcknowledgedError => Err(MechanismError::UnexpectedChallenge),
        }
    }
}
