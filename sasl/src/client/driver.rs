use log::{debug, trace, warn};

use crate::client::{
    DefinedCondition, Failure, MechanismError, Outcome, Reason, Registry, Session, Stage,
};
use crate::common::Connection;
use crate::error::UsageError;

/// Where a [`Driver`] is in the exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Nothing happened yet.
    Idle,
    /// Picking a mechanism out of the server’s offer.
    Selecting,
    /// A session is bound, the first challenge of a server-first mechanism is pending.
    AwaitingFirstMove,
    /// Answering challenges until the server concludes.
    Exchanging,
    /// The server accepted the authentication.
    Succeeded,
    /// The exchange failed, or never started.
    Failed,
}

/// A message the client has to send to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Starts the exchange with the selected mechanism.
    Auth {
        /// The mechanism name.
        mechanism: String,
        /// The initial response of a client-first mechanism.
        initial_response: Option<Vec<u8>>,
    },
    /// Answers the latest challenge.
    Response(Vec<u8>),
    /// Gives up on the exchange.
    Abort,
}

/// Something the server sent, or the end of the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// A challenge, already decoded from its envelope.
    Challenge(Vec<u8>),
    /// The server accepted the authentication, optionally with additional data.
    Success(Option<Vec<u8>>),
    /// The server refused the authentication.
    Failure {
        /// The condition sent by the server.
        condition: DefinedCondition,
        /// The optional human-readable text.
        text: Option<String>,
    },
    /// The transport went away.
    Disconnected,
}

/// What to do after feeding an event to a [`Driver`].
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Send this request and wait for the next server event.
    Send(Request),
    /// Send [`Request::Abort`], the exchange is over with this outcome.
    Abort(Outcome),
    /// The exchange is over with this outcome, nothing more to send.
    Finished(Outcome),
}

/// The state machine running one negotiation over one connection.
///
/// It never does any I/O itself: each call returns the next [`Step`], and the caller
/// feeds server events back in the order they were received.
///
/// ```
/// use xmpp_sasl::client::{Driver, Registry, Request, ServerEvent, Step};
/// use xmpp_sasl::common::{ConnectionInfo, Credentials};
///
/// let registry = Registry::with_defaults();
/// let conn = ConnectionInfo::new(
///     "capulet.lit",
///     Credentials::default()
///         .with_username("juliet")
///         .with_password("r0m30myr0m30"),
/// );
/// let mut driver = Driver::new(&registry, &conn);
/// let step = driver.start(&["PLAIN", "ANONYMOUS"]).unwrap();
/// assert_eq!(
///     step,
///     Step::Send(Request::Auth {
///         mechanism: "PLAIN".to_owned(),
///         initial_response: None,
///     })
/// );
/// let step = driver.handle(ServerEvent::Challenge(Vec::new())).unwrap();
/// assert_eq!(
///     step,
///     Step::Send(Request::Response(b"\0juliet\0r0m30myr0m30".to_vec()))
/// );
/// let step = driver.handle(ServerEvent::Success(None)).unwrap();
/// assert!(matches!(step, Step::Finished(ref outcome) if outcome.is_success()));
/// ```
pub struct Driver<'a> {
    registry: &'a Registry,
    connection: &'a dyn Connection,
    state: State,
    mechanism: Option<String>,
    session: Option<Session<'a>>,
    rounds: usize,
    max_rounds: usize,
    outcome: Option<Outcome>,
}

impl<'a> Driver<'a> {
    /// The default cap on the number of challenges in one session.
    pub const DEFAULT_MAX_ROUNDS: usize = 10;

    /// Creates an idle driver for this connection.
    pub fn new(registry: &'a Registry, connection: &'a dyn Connection) -> Driver<'a> {
        Driver {
            registry,
            connection,
            state: State::Idle,
            mechanism: None,
            session: None,
            rounds: 0,
            max_rounds: Self::DEFAULT_MAX_ROUNDS,
            outcome: None,
        }
    }

    /// Changes the cap on the number of challenges in one session.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Driver<'a> {
        self.max_rounds = max_rounds;
        self
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The selected mechanism, once selection happened.
    pub fn mechanism(&self) -> Option<&str> {
        self.mechanism.as_deref()
    }

    /// The terminal outcome, once reached.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Selects a mechanism among `offered` and starts the exchange.
    pub fn start<S: AsRef<str>>(&mut self, offered: &[S]) -> Result<Step, UsageError> {
        self.start_excluding(offered, &[])
    }

    /// Same as [`start`](Driver::start), never selecting any of the `excluded`
    /// mechanisms.
    pub fn start_excluding<S: AsRef<str>>(
        &mut self,
        offered: &[S],
        excluded: &[&str],
    ) -> Result<Step, UsageError> {
        if self.state != State::Idle {
            return Err(UsageError::DriverAlreadyStarted);
        }
        self.state = State::Selecting;

        let registry = self.registry;
        let mechanism = match registry.select_excluding(offered, self.connection, excluded) {
            Ok(mechanism) => mechanism,
            Err(err) => {
                warn!("SASL negotiation failed: {}", err);
                let outcome = Outcome::NoCompatibleMechanism(err);
                self.state = State::Failed;
                self.outcome = Some(outcome.clone());
                return Ok(Step::Finished(outcome));
            }
        };
        let name = mechanism.name().to_owned();
        self.mechanism = Some(name.clone());

        let mut session = match Session::on_start(mechanism, self.connection) {
            Ok(session) => session,
            Err(MechanismError::Usage(err)) => {
                debug!("Not starting {}: {}", name, err);
                self.mechanism = None;
                self.state = State::Idle;
                return Err(err);
            }
            Err(err) => {
                return Ok(Step::Finished(self.fail(
                    Stage::Start,
                    Reason::ProtocolViolation(err),
                )))
            }
        };
        debug!("SASL state: {:?} -> {:?}", self.state, State::AwaitingFirstMove);
        self.state = State::AwaitingFirstMove;

        let initial_response = if session.is_client_first() {
            match session.client_challenge() {
                Ok(response) => Some(response),
                Err(err) => {
                    self.session = Some(session);
                    return Ok(Step::Finished(self.fail(
                        Stage::InitialResponse,
                        Reason::ProtocolViolation(err),
                    )));
                }
            }
        } else {
            None
        };
        self.session = Some(session);
        if initial_response.is_some() {
            debug!("SASL state: {:?} -> {:?}", self.state, State::Exchanging);
            self.state = State::Exchanging;
        }
        Ok(Step::Send(Request::Auth {
            mechanism: name,
            initial_response,
        }))
    }

    /// Feeds the next server event.
    pub fn handle(&mut self, event: ServerEvent) -> Result<Step, UsageError> {
        match self.state {
            State::Idle | State::Selecting => return Err(UsageError::DriverNotStarted),
            State::Succeeded | State::Failed => {
                return match (event, &self.outcome) {
                    (ServerEvent::Disconnected, Some(outcome)) => {
                        Ok(Step::Finished(outcome.clone()))
                    }
                    _ => Err(UsageError::DriverFinished),
                };
            }
            State::AwaitingFirstMove | State::Exchanging => (),
        }

        match event {
            ServerEvent::Challenge(challenge) => self.on_challenge(challenge),
            ServerEvent::Success(_) if self.state == State::AwaitingFirstMove => {
                let err = MechanismError::SuccessBeforeFirstChallenge;
                Ok(Step::Finished(
                    self.fail(Stage::Start, Reason::ProtocolViolation(err)),
                ))
            }
            ServerEvent::Success(additional_data) => self.on_success(additional_data),
            ServerEvent::Failure { condition, text } => {
                let stage = self.current_stage();
                Ok(Step::Finished(
                    self.fail(stage, Reason::CredentialRejected { condition, text }),
                ))
            }
            ServerEvent::Disconnected => {
                let stage = self.current_stage();
                Ok(Step::Finished(self.fail(stage, Reason::Cancelled)))
            }
        }
    }

    /// Tears the exchange down after the connection went away.
    ///
    /// The session is failed exactly once; calling this on a finished driver returns
    /// the existing outcome.
    pub fn cancel(&mut self) -> Outcome {
        if let Some(ref outcome) = self.outcome {
            return outcome.clone();
        }
        let stage = match self.state {
            State::AwaitingFirstMove | State::Exchanging => self.current_stage(),
            _ => Stage::Start,
        };
        self.fail(stage, Reason::Cancelled)
    }

    /// A server-first session waiting for its first challenge hasn’t sent anything yet.
    fn current_stage(&self) -> Stage {
        match (self.state, self.rounds) {
            (State::AwaitingFirstMove, _) => Stage::Start,
            (_, 0) => Stage::InitialResponse,
            (_, round) => Stage::Challenge { round },
        }
    }

    fn on_challenge(&mut self, challenge: Vec<u8>) -> Result<Step, UsageError> {
        let first_move = self.state == State::AwaitingFirstMove;
        if first_move {
            debug!("SASL state: {:?} -> {:?}", self.state, State::Exchanging);
            self.state = State::Exchanging;
        }
        self.rounds += 1;
        let stage = self.current_stage();
        if self.rounds > self.max_rounds {
            let err = MechanismError::TooManyChallenges(self.max_rounds);
            return Ok(Step::Abort(
                self.fail(stage, Reason::ProtocolViolation(err)),
            ));
        }
        let session = self.session.as_mut().ok_or(UsageError::SessionReleased)?;
        let challenge = if first_move && challenge.is_empty() {
            None
        } else {
            Some(&challenge[..])
        };
        match session.on_challenge(challenge) {
            Ok(response) => {
                trace!("Answering challenge {} with {} bytes", self.rounds, response.len());
                Ok(Step::Send(Request::Response(response)))
            }
            Err(err) => Ok(Step::Abort(
                self.fail(stage, Reason::ProtocolViolation(err)),
            )),
        }
    }

    fn on_success(&mut self, additional_data: Option<Vec<u8>>) -> Result<Step, UsageError> {
        let session = self.session.as_mut().ok_or(UsageError::SessionReleased)?;
        if let Err(err) = session.on_success(additional_data.as_deref()) {
            return Ok(Step::Finished(
                self.fail(Stage::Success, Reason::ProtocolViolation(err)),
            ));
        }
        self.session = None;
        debug!("SASL state: {:?} -> {:?}", self.state, State::Succeeded);
        self.state = State::Succeeded;
        let outcome = Outcome::Succeeded {
            mechanism: self.mechanism.clone().unwrap_or_default(),
        };
        self.outcome = Some(outcome.clone());
        Ok(Step::Finished(outcome))
    }

    fn fail(&mut self, stage: Stage, reason: Reason) -> Outcome {
        if let Some(mut session) = self.session.take() {
            session.on_failure();
        }
        let failure = Failure {
            mechanism: self.mechanism.clone(),
            stage,
            reason,
        };
        warn!("SASL authentication failed: {}", failure);
        self.state = State::Failed;
        let outcome = Outcome::Failed(failure);
        self.outcome = Some(outcome.clone());
        outcome
    }
}
