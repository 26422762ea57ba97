//! Provides the SASL "EXTERNAL" mechanism.

use crate::client::{Exchange, Mechanism, MechanismError, Priority};
use crate::common::Connection;

/// A struct for the SASL EXTERNAL mechanism, relying on an identity the transport
/// already verified, typically a TLS client certificate.
#[derive(Clone, Copy, Debug, Default)]
pub struct External;

impl External {
    /// Constructs a new struct for authenticating using the SASL EXTERNAL mechanism.
    pub fn new() -> External {
        External
    }
}

impl Mechanism for External {
    fn name(&self) -> &str {
        "EXTERNAL"
    }

    fn is_client_first(&self) -> bool {
        true
    }

    fn priority(&self) -> Priority {
        10
    }

    fn test(&self, connection: &dyn Connection) -> bool {
        connection.is_channel_authenticated()
    }

    fn on_start(&self, connection: &dyn Connection) -> Result<Box<dyn Exchange>, MechanismError> {
        if !connection.is_channel_authenticated() {
            return Err(MechanismError::ExternalRequiresAuthenticatedChannel);
        }
        Ok(Box::new(ExternalExchange { sent: false }))
    }
}

struct ExternalExchange {
    sent: bool,
}

impl Exchange for ExternalExchange {
    fn on_challenge(
        &mut self,
        connection: &dyn Connection,
        _challenge: Option<&[u8]>,
    ) -> Result<Vec<u8>, MechanismError> {
        if self.sent {
            return Err(MechanismError::UnexpectedChallenge);
        }
        self.sent = true;
        Ok(connection
            .credentials()
            .authzid
            .as_deref()
            .map(|authzid| authzid.as_bytes().to_vec())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ConnectionInfo, Credentials};

    #[test]
    fn needs_authenticated_channel() {
        let conn = ConnectionInfo::new("capulet.lit", Credentials::default());
        assert!(!External.test(&conn));
        assert_eq!(
            External.on_start(&conn).err(),
            Some(MechanismError::ExternalRequiresAuthenticatedChannel)
        );
    }

    #[test]
    fn sends_authzid_or_nothing() {
        let conn = ConnectionInfo::new("capulet.lit", Credentials::default())
            .with_authenticated_channel();
        let mut exchange = External.on_start(&conn).unwrap();
        assert_eq!(exchange.on_challenge(&conn, None).unwrap(), b"");

        let conn = ConnectionInfo::new(
            "capulet.lit",
            Credentials::default().with_authzid("juliet@capulet.lit"),
        )
        .with_authenticated_channel();
        let mut exchange = External.on_start(&conn).unwrap();
        assert_eq!(
            exchange.on_challenge(&conn, None).unwrap(),
            b"juliet@capulet.lit"
        );
        assert_eq!(
            exchange.on_challenge(&conn, Some(&b""[..])),
            Err(MechanismError::UnexpectedChallenge)
        );
    }
}
