#![cfg(feature = "async")]

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream;
use futures::Sink;

use xmpp_sasl::client::mechanisms::{External, Plain};
use xmpp_sasl::client::{
    authenticate, DefinedCondition, Registry, Request, ServerEvent, Session,
};
use xmpp_sasl::common::{ConnectionInfo, Credentials};
use xmpp_sasl::{Error, ErrorKind, UsageError};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn juliet() -> ConnectionInfo {
    ConnectionInfo::new(
        "capulet.lit",
        Credentials::default()
            .with_username("juliet")
            .with_password("r0m30myr0m30"),
    )
}

fn plain_only() -> Registry {
    let mut registry = Registry::new();
    registry.register(Plain::new()).unwrap();
    registry
}

fn assert_send<T: Send>(_: &T) {}

/// A transport whose sending half is already closed.
struct BrokenSink;

impl Sink<Request> for BrokenSink {
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")))
    }

    fn start_send(self: Pin<&mut Self>, _item: Request) -> Result<(), io::Error> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn plain_over_a_scripted_server() {
    init_logger();
    let registry = plain_only();
    let conn = juliet();
    let mut sent: Vec<Request> = Vec::new();
    let mut events = stream::iter(vec![
        ServerEvent::Challenge(Vec::new()),
        ServerEvent::Success(None),
    ]);

    let mechanism = authenticate(&mut sent, &mut events, &registry, &conn, &["PLAIN"])
        .await
        .unwrap();
    assert_eq!(mechanism, "PLAIN");
    assert_eq!(
        sent,
        vec![
            Request::Auth {
                mechanism: "PLAIN".to_owned(),
                initial_response: None,
            },
            Request::Response(b"\0juliet\0r0m30myr0m30".to_vec()),
        ]
    );
}

#[tokio::test]
async fn rejection_is_reported() {
    init_logger();
    let registry = plain_only();
    let conn = juliet();
    let mut sent: Vec<Request> = Vec::new();
    let mut events = stream::iter(vec![
        ServerEvent::Challenge(Vec::new()),
        ServerEvent::Failure {
            condition: DefinedCondition::NotAuthorized,
            text: None,
        },
    ]);

    let err = authenticate(&mut sent, &mut events, &registry, &conn, &["PLAIN"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CredentialRejected);
    assert_eq!(sent.len(), 2);
}

#[tokio::test]
async fn unexpected_challenge_sends_abort() {
    init_logger();
    let registry = plain_only();
    let conn = juliet();
    let mut sent: Vec<Request> = Vec::new();
    let mut events = stream::iter(vec![
        ServerEvent::Challenge(Vec::new()),
        ServerEvent::Challenge(b"again".to_vec()),
    ]);

    let err = authenticate(&mut sent, &mut events, &registry, &conn, &["PLAIN"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert_eq!(sent.last(), Some(&Request::Abort));
}

#[tokio::test]
async fn end_of_stream_cancels() {
    init_logger();
    let registry = plain_only();
    let conn = juliet();
    let mut sent: Vec<Request> = Vec::new();
    let mut events = stream::iter(Vec::<ServerEvent>::new());

    let err = authenticate(&mut sent, &mut events, &registry, &conn, &["PLAIN"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn nothing_to_attempt() {
    init_logger();
    let mut registry = Registry::new();
    registry.register(External::new()).unwrap();
    let conn = juliet();
    let mut sent: Vec<Request> = Vec::new();
    let mut events = stream::iter(Vec::<ServerEvent>::new());

    let err = authenticate(&mut sent, &mut events, &registry, &conn, &["PLAIN"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoCompatibleMechanism);
    assert!(sent.is_empty());
}

#[tokio::test]
async fn transport_errors_surface() {
    init_logger();
    let registry = plain_only();
    let conn = juliet();
    let mut events = stream::iter(Vec::<ServerEvent>::new());

    let err = authenticate(&mut BrokenSink, &mut events, &registry, &conn, &["PLAIN"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[test]
fn negotiation_can_move_between_threads() {
    let registry = plain_only();
    let conn = juliet();
    let mut sent: Vec<Request> = Vec::new();
    let mut events = stream::iter(vec![ServerEvent::Challenge(Vec::new())]);
    let negotiation = authenticate(&mut sent, &mut events, &registry, &conn, &["PLAIN"]);
    assert_send(&negotiation);
}

#[tokio::test]
async fn busy_connection_is_refused() {
    init_logger();
    let registry = plain_only();
    let conn = juliet();
    let _bound = Session::on_start(&Plain::new(), &conn).unwrap();
    let mut sent: Vec<Request> = Vec::new();
    let mut events = stream::iter(Vec::<ServerEvent>::new());

    let err = authenticate(&mut sent, &mut events, &registry, &conn, &["PLAIN"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(matches!(
        err,
        Error::Usage(UsageError::SessionAlreadyActive)
    ));
    assert!(sent.is_empty());
}
