use log::{debug, trace};

use crate::client::{Exchange, Mechanism, MechanismError};
use crate::common::Connection;
use crate::error::UsageError;

/// One authentication attempt with one mechanism.
///
/// The session borrows the connection from [`on_start`](Session::on_start) until
/// [`on_success`](Session::on_success) or [`on_failure`](Session::on_failure), whichever
/// comes first; after that every call is either a no-op or a [`UsageError`]. Dropping a
/// bound session counts as a failure.
///
/// Only one session may be bound to a connection at a time, a second
/// [`on_start`](Session::on_start) fails with [`UsageError::SessionAlreadyActive`] until
/// the first one is released.
pub struct Session<'c> {
    mechanism: String,
    client_first: bool,
    exchange: Box<dyn Exchange>,
    connection: Option<&'c dyn Connection>,
    first_move_done: bool,
}

impl<'c> Session<'c> {
    /// Starts a new attempt of `mechanism` on `connection`.
    pub fn on_start(
        mechanism: &dyn Mechanism,
        connection: &'c dyn Connection,
    ) -> Result<Session<'c>, MechanismError> {
        if !connection.session_lock().try_acquire() {
            return Err(UsageError::SessionAlreadyActive.into());
        }
        let exchange = match mechanism.on_start(connection) {
            Ok(exchange) => exchange,
            Err(err) => {
                connection.session_lock().release();
                return Err(err);
            }
        };
        debug!("Starting SASL session with {}", mechanism.name());
        Ok(Session {
            mechanism: mechanism.name().to_owned(),
            client_first: mechanism.is_client_first(),
            exchange,
            connection: Some(connection),
            first_move_done: false,
        })
    }

    /// The name of the mechanism this session runs.
    pub fn mechanism(&self) -> &str {
        &self.mechanism
    }

    /// Whether the client has to speak first.
    pub fn is_client_first(&self) -> bool {
        self.client_first
    }

    /// Whether the session still holds its connection.
    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    /// Produces the initial response of a client-first mechanism.
    pub fn client_challenge(&mut self) -> Result<Vec<u8>, MechanismError> {
        if !self.client_first {
            return Err(UsageError::ClientChallengeOnServerFirst(self.mechanism.clone()).into());
        }
        if self.first_move_done {
            return Err(UsageError::ClientChallengeRepeated.into());
        }
        let connection = self.connection.ok_or(UsageError::SessionReleased)?;
        self.first_move_done = true;
        let response = self.exchange.on_challenge(connection, None)?;
        trace!(
            "{} initial response is {} bytes",
            self.mechanism,
            response.len()
        );
        Ok(response)
    }

    /// Produces the response to a server challenge.
    pub fn on_challenge(&mut self, challenge: Option<&[u8]>) -> Result<Vec<u8>, MechanismError> {
        let connection = self.connection.ok_or(UsageError::SessionReleased)?;
        if self.client_first && !self.first_move_done {
            return Err(UsageError::ChallengeBeforeClientChallenge.into());
        }
        self.first_move_done = true;
        trace!(
            "{} got a challenge of {} bytes",
            self.mechanism,
            challenge.map_or(0, <[u8]>::len)
        );
        self.exchange.on_challenge(connection, challenge)
    }

    /// Verifies the server’s success data, then releases the connection.
    ///
    /// On a verification error the session stays bound, the caller is expected to
    /// follow up with [`on_failure`](Session::on_failure).
    pub fn on_success(&mut self, additional_data: Option<&[u8]>) -> Result<(), MechanismError> {
        if self.connection.is_none() {
            return Ok(());
        }
        self.exchange.on_success(additional_data)?;
        if let Some(connection) = self.connection.take() {
            connection.session_lock().release();
        }
        debug!("SASL session with {} succeeded", self.mechanism);
        Ok(())
    }

    /// Abandons the exchange and releases the connection.
    pub fn on_failure(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.exchange.on_failure();
            connection.session_lock().release();
            debug!("SASL session with {} failed", self.mechanism);
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.on_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mechanisms::{Anonymous, Plain};
    use crate::client::Priority;
    use crate::common::{ConnectionInfo, Credentials};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn connection() -> ConnectionInfo {
        ConnectionInfo::new(
            "capulet.lit",
            Credentials::default()
                .with_username("juliet")
                .with_password("r0m30myr0m30"),
        )
    }

    struct Echo {
        failures: Arc<AtomicUsize>,
    }

    struct EchoExchange {
        failures: Arc<AtomicUsize>,
    }

    impl Mechanism for Echo {
        fn name(&self) -> &str {
            "X-ECHO"
        }

        fn is_client_first(&self) -> bool {
            true
        }

        fn priority(&self) -> Priority {
            0
        }

        fn on_start(&self, _: &dyn Connection) -> Result<Box<dyn Exchange>, MechanismError> {
            Ok(Box::new(EchoExchange {
                failures: self.failures.clone(),
            }))
        }
    }

    impl Exchange for EchoExchange {
        fn on_challenge(
            &mut self,
            _: &dyn Connection,
            challenge: Option<&[u8]>,
        ) -> Result<Vec<u8>, MechanismError> {
            Ok(challenge.unwrap_or(&b"hello"[..]).to_vec())
        }

        fn on_failure(&mut self) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn client_challenge_on_server_first_is_a_usage_error() {
        let conn = connection();
        let mut session = Session::on_start(&Plain::new(), &conn).unwrap();
        assert_eq!(
            session.client_challenge(),
            Err(MechanismError::Usage(
                UsageError::ClientChallengeOnServerFirst("PLAIN".to_owned())
            ))
        );
        assert_eq!(
            session.on_challenge(None).unwrap(),
            b"\0juliet\0r0m30myr0m30"
        );
    }

    #[test]
    fn client_first_ordering() {
        let conn = connection();
        let failures = Arc::new(AtomicUsize::new(0));
        let echo = Echo {
            failures: failures.clone(),
        };
        let mut session = Session::on_start(&echo, &conn).unwrap();
        assert_eq!(
            session.on_challenge(Some(&b"early"[..])),
            Err(MechanismError::Usage(
                UsageError::ChallengeBeforeClientChallenge
            ))
        );
        assert_eq!(session.client_challenge().unwrap(), b"hello");
        assert_eq!(
            session.client_challenge(),
            Err(MechanismError::Usage(UsageError::ClientChallengeRepeated))
        );
        assert_eq!(session.on_challenge(Some(&b"ping"[..])).unwrap(), b"ping");
    }

    #[test]
    fn release_is_idempotent() {
        let conn = connection();
        let failures = Arc::new(AtomicUsize::new(0));
        let echo = Echo {
            failures: failures.clone(),
        };

        let mut session = Session::on_start(&echo, &conn).unwrap();
        session.on_failure();
        session.on_failure();
        assert_eq!(session.on_success(None), Ok(()));
        assert!(!session.is_bound());
        assert_eq!(
            session.on_challenge(Some(&b"late"[..])),
            Err(MechanismError::Usage(UsageError::SessionReleased))
        );
        drop(session);
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        let mut session = Session::on_start(&echo, &conn).unwrap();
        session.on_success(None).unwrap();
        session.on_failure();
        session.on_success(None).unwrap();
        drop(session);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_session_per_connection() {
        let conn = connection();
        let failures = Arc::new(AtomicUsize::new(0));
        let echo = Echo {
            failures: failures.clone(),
        };

        let mut first = Session::on_start(&echo, &conn).unwrap();
        assert!(conn.session_lock().is_active());
        assert_eq!(
            Session::on_start(&Plain::new(), &conn).err(),
            Some(MechanismError::Usage(UsageError::SessionAlreadyActive))
        );
        assert!(first.is_bound());

        // A copy of the connection is another connection.
        let other = conn.clone();
        assert!(!other.session_lock().is_active());
        Session::on_start(&Plain::new(), &other).unwrap();

        first.on_failure();
        assert!(!conn.session_lock().is_active());
        let mut second = Session::on_start(&Plain::new(), &conn).unwrap();
        second.on_challenge(None).unwrap();
        second.on_success(None).unwrap();
        assert!(!conn.session_lock().is_active());
        Session::on_start(&echo, &conn).unwrap();
    }

    #[test]
    fn refused_start_leaves_the_connection_free() {
        let conn = connection();
        assert_eq!(
            Session::on_start(&Anonymous::new(), &conn).err(),
            Some(MechanismError::AnonymousRequiresNoCredentials)
        );
        assert!(!conn.session_lock().is_active());
        Session::on_start(&Plain::new(), &conn).unwrap();
    }

    #[test]
    fn dropping_a_bound_session_fails_it() {
        let conn = connection();
        let failures = Arc::new(AtomicUsize::new(0));
        let echo = Echo {
            failures: failures.clone(),
        };
        let session = Session::on_start(&echo, &conn).unwrap();
        drop(session);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(!conn.session_lock().is_active());
    }
}
