use std::error::Error as StdError;

use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, warn};

use crate::client::{Driver, Registry, Request, ServerEvent, Step};
use crate::common::Connection;
use crate::error::Error;

/// Runs a whole negotiation over the two halves of a transport, returning the name of
/// the mechanism which succeeded.
///
/// The end of `stream` counts as a disconnection. If `sink` fails, the session is
/// cancelled and the transport error returned.
pub async fn authenticate<Si, St, S>(
    sink: &mut Si,
    stream: &mut St,
    registry: &Registry,
    connection: &dyn Connection,
    offered: &[S],
) -> Result<String, Error>
where
    Si: Sink<Request> + Unpin,
    Si::Error: StdError + Send + Sync + 'static,
    St: Stream<Item = ServerEvent> + Unpin,
    S: AsRef<str>,
{
    let mut driver = Driver::new(registry, connection);
    let mut step = driver.start(offered)?;
    loop {
        match step {
            Step::Send(request) => {
                if let Err(err) = sink.send(request).await {
                    warn!("Transport failed during SASL negotiation: {}", err);
                    driver.cancel();
                    return Err(Error::Transport(Box::new(err)));
                }
            }
            Step::Abort(outcome) => {
                if let Err(err) = sink.send(Request::Abort).await {
                    debug!("Couldn’t send SASL abort: {}", err);
                }
                return outcome.into_result();
            }
            Step::Finished(outcome) => return outcome.into_result(),
        }
        let event = stream.next().await.unwrap_or(ServerEvent::Disconnected);
        step = driver.handle(event)?;
    }
}
