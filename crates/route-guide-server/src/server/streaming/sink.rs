//! One-feature-at-a-time transmission into a gRPC response stream.

use core::{pin::Pin, time::Duration};
use futures::{Stream, StreamExt};
use route_guide_core::proto::Feature;
use tokio::sync::{
    mpsc::{self, error::SendTimeoutError},
    oneshot,
};
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

/// Response stream handed to tonic for a `ListFeatures` call.
pub type FeatureStream = Pin<Box<dyn Stream<Item = Result<Feature, Status>> + Send>>;

/// Why a single send did not reach the response stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The response stream was dropped by the transport: the peer is gone.
    #[error("client disconnected")]
    Disconnected,

    /// The client stopped reading and no buffer capacity appeared in time.
    #[error("client stopped reading for {after:?}")]
    Stalled { after: Duration },
}

impl SinkError {
    /// Whether this failure is the transport's view of the client going away,
    /// as opposed to a genuine transmission problem.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// A transmission capability that accepts one feature per call and resolves
/// once the feature has been handed to the transport or the send failed.
pub trait FeatureSink {
    fn send(&mut self, feature: Feature) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Sink writing into the bounded channel backing a tonic response stream.
///
/// With a small buffer, `send` only resolves once the client has pulled
/// earlier items, which keeps the pace set by the deliverer close to what the
/// client actually observes.
pub struct ResponseSink {
    tx: mpsc::Sender<Result<Feature, Status>>,
    trailer: oneshot::Sender<Status>,
    send_timeout: Option<Duration>,
}

impl ResponseSink {
    /// Creates the sink together with the response stream handed to tonic.
    ///
    /// The stream yields every feature sent, then ends once the sink is
    /// dropped. If the sink was closed with [`fail`](Self::fail), the status
    /// is yielded as the last item, after any features still buffered.
    pub fn channel(buffer: usize, send_timeout: Option<Duration>) -> (Self, FeatureStream) {
        let (tx, rx) = mpsc::channel(buffer);
        let (trailer, trailer_rx) = oneshot::channel();

        let tail = futures::stream::once(trailer_rx)
            .filter_map(|status| async move { status.ok().map(Err) });
        let stream = ReceiverStream::new(rx).chain(tail);

        let sink = Self {
            tx,
            trailer,
            send_timeout,
        };
        (sink, Box::pin(stream))
    }

    /// Sender handle used to watch for the response stream going away.
    pub fn sender(&self) -> &mpsc::Sender<Result<Feature, Status>> {
        &self.tx
    }

    /// Closes the sink and ends the stream with `status` instead of a clean
    /// end-of-stream. A client that already left never sees it.
    pub fn fail(self, status: Status) {
        if self.trailer.send(status).is_err() {
            tracing::debug!("Response stream dropped before terminal status");
        }
    }
}

impl FeatureSink for ResponseSink {
    async fn send(&mut self, feature: Feature) -> Result<(), SinkError> {
        match self.send_timeout {
            Some(after) => match self.tx.send_timeout(Ok(feature), after).await {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Closed(_)) => Err(SinkError::Disconnected),
                Err(SendTimeoutError::Timeout(_)) => Err(SinkError::Stalled { after }),
            },
            None => self
                .tx
                .send(Ok(feature))
                .await
                .map_err(|_| SinkError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(name: &str) -> Feature {
        Feature {
            name: name.to_string(),
            location: None,
        }
    }

    #[tokio::test]
    async fn forwards_features_in_order_then_ends() {
        let (mut sink, mut stream) = ResponseSink::channel(4, None);
        sink.send(feature("A")).await.unwrap();
        sink.send(feature("B")).await.unwrap();
        drop(sink);

        assert_eq!(stream.next().await.unwrap().unwrap().name, "A");
        assert_eq!(stream.next().await.unwrap().unwrap().name, "B");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_stream_is_a_disconnect() {
        let (mut sink, stream) = ResponseSink::channel(1, Some(Duration::from_secs(1)));
        drop(stream);

        let err = sink.send(feature("A")).await.unwrap_err();
        assert_eq!(err, SinkError::Disconnected);
        assert!(err.is_disconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn full_buffer_stalls_after_timeout() {
        let after = Duration::from_millis(250);
        let (mut sink, _stream) = ResponseSink::channel(1, Some(after));
        sink.send(feature("A")).await.unwrap();

        let err = sink.send(feature("B")).await.unwrap_err();
        assert_eq!(err, SinkError::Stalled { after });
        assert!(!err.is_disconnect());
    }

    #[tokio::test]
    async fn failure_status_follows_buffered_features() {
        let (mut sink, mut stream) = ResponseSink::channel(1, None);
        sink.send(feature("A")).await.unwrap();
        sink.fail(Status::unavailable("stalled"));

        assert_eq!(stream.next().await.unwrap().unwrap().name, "A");
        let status = stream.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert!(stream.next().await.is_none());
    }
}
