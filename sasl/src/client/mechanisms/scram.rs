//! Provides the SASL "SCRAM-*" mechanisms and a way to implement more.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use log::trace;

use crate::client::{Exchange, Mechanism, MechanismError, Priority};
use crate::common::scram::{generate_nonce, ScramProvider};
use crate::common::{escape_saslname, parse_frame, xor, Connection, Password};

type NonceGenerator = Arc<dyn Fn() -> Result<String, MechanismError> + Send + Sync>;

/// A struct for the SASL SCRAM-* mechanisms, without channel binding.
pub struct Scram<S: ScramProvider> {
    name: String,
    nonce_generator: NonceGenerator,
    _marker: PhantomData<fn() -> S>,
}

impl<S: ScramProvider> Scram<S> {
    /// Constructs a new struct for authenticating using the SASL SCRAM-* mechanism
    /// matching `S`, with nonces from the operating system’s random source.
    pub fn new() -> Scram<S> {
        Scram {
            name: format!("SCRAM-{}", S::name()),
            nonce_generator: Arc::new(|| generate_nonce().map_err(MechanismError::CannotGenerateNonce)),
            _marker: PhantomData,
        }
    }

    /// Replaces the nonce source, so that exchanges can be replayed.
    pub fn with_nonce_generator<F>(mut self, generator: F) -> Scram<S>
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.nonce_generator = Arc::new(move || Ok(generator()));
        self
    }
}

impl<S: ScramProvider> Default for Scram<S> {
    fn default() -> Scram<S> {
        Scram::new()
    }
}

impl<S: ScramProvider> fmt::Debug for Scram<S> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Scram").field("name", &self.name).finish()
    }
}

fn is_valid_nonce(nonce: &str) -> bool {
    !nonce.is_empty() && nonce.bytes().all(|b| (0x21..=0x7e).contains(&b) && b != b',')
}

impl<S: ScramProvider + 'static> Mechanism for Scram<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_client_first(&self) -> bool {
        true
    }

    fn priority(&self) -> Priority {
        S::default_priority()
    }

    fn test(&self, connection: &dyn Connection) -> bool {
        let credentials = connection.credentials();
        if credentials.username().is_none() {
            return false;
        }
        match credentials.password() {
            Some(Password::Plain(_)) => true,
            Some(Password::Pbkdf2 { method, .. }) => method == S::name(),
            None => false,
        }
    }

    fn on_start(&self, connection: &dyn Connection) -> Result<Box<dyn Exchange>, MechanismError> {
        let credentials = connection.credentials();
        if credentials.username().is_none() {
            return Err(MechanismError::ScramRequiresUsername);
        }
        if credentials.password().is_none() {
            return Err(MechanismError::ScramRequiresPassword);
        }
        let client_nonce = (self.nonce_generator)()?;
        if !is_valid_nonce(&client_nonce) {
            return Err(MechanismError::InvalidNonce);
        }
        Ok(Box::new(ScramExchange::<S> {
            client_nonce,
            state: ScramState::Init,
            _marker: PhantomData,
        }))
    }
}

enum ScramState {
    Init,
    SentInitialMessage {
        initial_message: Vec<u8>,
        gs2_header: Vec<u8>,
    },
    GotServerData {
        server_key: Vec<u8>,
        auth_message: Vec<u8>,
    },
    Verified,
    Done,
}

struct ScramExchange<S: ScramProvider> {
    client_nonce: String,
    state: ScramState,
    _marker: PhantomData<fn() -> S>,
}

impl<S: ScramProvider> ScramExchange<S> {
    fn initial(&mut self, connection: &dyn Connection) -> Result<Vec<u8>, MechanismError> {
        let username = connection
            .credentials()
            .username()
            .ok_or(MechanismError::ScramRequiresUsername)?;
        let gs2_header = b"n,,".to_vec();
        let mut bare = Vec::new();
        bare.extend(b"n=");
        bare.extend(escape_saslname(username).bytes());
        bare.extend(b",r=");
        bare.extend(self.client_nonce.bytes());
        let mut data = Vec::new();
        data.extend(&gs2_header);
        data.extend(&bare);
        self.state = ScramState::SentInitialMessage {
            initial_message: bare,
            gs2_header,
        };
        Ok(data)
    }

    fn response(
        &self,
        connection: &dyn Connection,
        initial_message: &[u8],
        gs2_header: &[u8],
        challenge: &[u8],
    ) -> Result<(Vec<u8>, ScramState), MechanismError> {
        let frame = parse_frame(challenge).map_err(|_| MechanismError::CannotDecodeChallenge)?;
        if let Some(err) = frame.get("e") {
            return Err(MechanismError::ServerError(err.clone()));
        }
        if frame.contains_key("m") {
            return Err(MechanismError::UnsupportedExtension);
        }
        let server_nonce = frame.get("r").ok_or(MechanismError::NoServerNonce)?;
        if server_nonce.len() <= self.client_nonce.len()
            || !server_nonce.starts_with(&self.client_nonce)
        {
            return Err(MechanismError::InvalidServerNonce);
        }
        let salt = frame
            .get("s")
            .and_then(|v| Base64.decode(v).ok())
            .filter(|salt| !salt.is_empty())
            .ok_or(MechanismError::NoServerSalt)?;
        let iterations: u32 = frame
            .get("i")
            .and_then(|v| v.parse().ok())
            .filter(|&i| i > 0)
            .ok_or(MechanismError::NoServerIterations)?;
        trace!(
            "SCRAM-{} server asked for {} iterations",
            S::name(),
            iterations
        );

        let password = connection
            .credentials()
            .password()
            .ok_or(MechanismError::ScramRequiresPassword)?;
        let salted_password = S::derive(password, &salt, iterations)?;
        let client_key = S::hmac(b"Client Key", &salted_password)?;
        let server_key = S::hmac(b"Server Key", &salted_password)?;

        let mut client_final_message_bare = Vec::new();
        client_final_message_bare.extend(b"c=");
        client_final_message_bare.extend(Base64.encode(gs2_header).bytes());
        client_final_message_bare.extend(b",r=");
        client_final_message_bare.extend(server_nonce.bytes());

        let mut auth_message = Vec::new();
        auth_message.extend(initial_message);
        auth_message.push(b',');
        auth_message.extend(challenge);
        auth_message.push(b',');
        auth_message.extend(&client_final_message_bare);

        let stored_key = S::hash(&client_key);
        let client_signature = S::hmac(&auth_message, &stored_key)?;
        let client_proof = xor(&client_key, &client_signature);

        let mut client_final_message = client_final_message_bare;
        client_final_message.extend(b",p=");
        client_final_message.extend(Base64.encode(client_proof).bytes());
        Ok((
            client_final_message,
            ScramState::GotServerData {
                server_key,
                auth_message,
            },
        ))
    }

    fn verify(&self, data: &[u8]) -> Result<(), MechanismError> {
        let (server_key, auth_message) = match self.state {
            ScramState::GotServerData {
                ref server_key,
                ref auth_message,
            } => (server_key, auth_message),
            _ => return Err(MechanismError::InvalidState),
        };
        let frame = parse_frame(data).map_err(|_| MechanismError::CannotDecodeSuccessResponse)?;
        if let Some(err) = frame.get("e") {
            return Err(MechanismError::ServerError(err.clone()));
        }
        let signature = frame
            .get("v")
            .ok_or(MechanismError::NoSignatureInSuccessResponse)?;
        let signature = Base64
            .decode(signature)
            .map_err(|_| MechanismError::InvalidSignatureInSuccessResponse)?;
        if S::verify(auth_message, server_key, &signature)? {
            Ok(())
        } else {
            Err(MechanismError::InvalidSignatureInSuccessResponse)
        }
    }
}

impl<S: ScramProvider> Exchange for ScramExchange<S> {
    fn on_challenge(
        &mut self,
        connection: &dyn Connection,
        challenge: Option<&[u8]>,
    ) -> Result<Vec<u8>, MechanismError> {
        match (&self.state, challenge) {
            (ScramState::Init, None) => self.initial(connection),
            (ScramState::Init, Some(_)) => Err(MechanismError::InvalidState),
            (
                ScramState::SentInitialMessage {
                    initial_message,
                    gs2_header,
                },
                Some(challenge),
            ) => {
                let (response, next_state) =
                    self.response(connection, initial_message, gs2_header, challenge)?;
                self.state = next_state;
                Ok(response)
            }
            (ScramState::SentInitialMessage { .. }, None) => {
                Err(MechanismError::CannotDecodeChallenge)
            }
            // Some servers send the final message as a challenge, and only then succeed.
            (ScramState::GotServerData { .. }, Some(data)) => {
                self.verify(data)?;
                self.state = ScramState::Verified;
                Ok(Vec::new())
            }
            _ => Err(MechanismError::UnexpectedChallenge),
        }
    }

    fn on_success(&mut self, additional_data: Option<&[u8]>) -> Result<(), MechanismError> {
        match self.state {
            ScramState::GotServerData { .. } => {
                let data = additional_data.ok_or(MechanismError::NoSignatureInSuccessResponse)?;
                self.verify(data)?;
            }
            ScramState::Verified => (),
            _ => return Err(MechanismError::InvalidState),
        }
        self.state = ScramState::Done;
        Ok(())
    }

    fn on_failure(&mut self) {
        self.state = ScramState::Done;
    }
}
