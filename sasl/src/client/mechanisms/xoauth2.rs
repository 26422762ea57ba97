//! Provides the Google-specific "X-OAUTH2" mechanism.

use crate::client::{Exchange, Mechanism, MechanismError, Priority};
use crate::common::Connection;

/// A struct for the X-OAUTH2 mechanism, a single message carrying the account and a
/// bearer token.
#[derive(Clone, Copy, Debug, Default)]
pub struct XOAuth2;

impl XOAuth2 {
    /// Constructs a new struct for authenticating using the X-OAUTH2 mechanism.
    pub fn new() -> XOAuth2 {
        XOAuth2
    }
}

impl Mechanism for XOAuth2 {
    fn name(&self) -> &str {
        "X-OAUTH2"
    }

    fn is_client_first(&self) -> bool {
        true
    }

    fn priority(&self) -> Priority {
        30
    }

    fn test(&self, connection: &dyn Connection) -> bool {
        connection.credentials().token().is_some()
    }

    fn on_start(&self, connection: &dyn Connection) -> Result<Box<dyn Exchange>, MechanismError> {
        if !self.test(connection) {
            return Err(MechanismError::OAuthRequiresToken);
        }
        Ok(Box::new(XOAuth2Exchange { sent: false }))
    }
}

struct XOAuth2Exchange {
    sent: bool,
}

impl Exchange for XOAuth2Exchange {
    fn on_challenge(
        &mut self,
        connection: &dyn Connection,
        _challenge: Option<&[u8]>,
    ) -> Result<Vec<u8>, MechanismError> {
        if self.sent {
            return Err(MechanismError::UnexpectedChallenge);
        }
        let credentials = connection.credentials();
        let token = credentials
            .token()
            .ok_or(MechanismError::OAuthRequiresToken)?;
        let account = match credentials.authzid {
            Some(ref authzid) => Some(authzid.clone()),
            None => connection.bare_jid(),
        };

        let mut auth = Vec::new();
        auth.push(0);
        if let Some(account) = account {
            auth.extend(account.bytes());
        }
        auth.push(0);
        auth.extend(token.bytes());
        self.sent = true;
        Ok(auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ConnectionInfo, Credentials};

    #[test]
    fn account_and_token() {
        let conn = ConnectionInfo::new(
            "gmail.com",
            Credentials::default()
                .with_username("juliet")
                .with_token("ya29.token"),
        );
        assert!(XOAuth2.test(&conn));
        let mut exchange = XOAuth2.on_start(&conn).unwrap();
        assert_eq!(
            exchange.on_challenge(&conn, None).unwrap(),
            b"\0juliet@gmail.com\0ya29.token"
        );
        assert_eq!(
            exchange.on_challenge(&conn, Some(&b"{}"[..])),
            Err(MechanismError::UnexpectedChallenge)
        );
    }

    #[test]
    fn authzid_wins_over_bare_jid() {
        let conn = ConnectionInfo::new(
            "gmail.com",
            Credentials::default()
                .with_username("juliet")
                .with_token("ya29.token")
                .with_authzid("romeo@gmail.com"),
        );
        let mut exchange = XOAuth2.on_start(&conn).unwrap();
        assert_eq!(
            exchange.on_challenge(&conn, None).unwrap(),
            b"\0romeo@gmail.com\0ya29.token"
        );
    }

    #[test]
    fn needs_a_token() {
        let conn = ConnectionInfo::new(
            "gmail.com",
            Credentials::default()
                .with_username("juliet")
                .with_password("pass"),
        );
        assert!(!XOAuth2.test(&conn));
        assert_eq!(
            XOAuth2.on_start(&conn).err(),
            Some(MechanismError::OAuthRequiresToken)
        );
    }
}
