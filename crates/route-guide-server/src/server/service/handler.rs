//! gRPC service implementation for paced feature streaming.
//!
//! This module defines [`RouteGuideService`], the implementation of the
//! [`RouteGuide`] service from `route_guide.proto`. Its single endpoint,
//! `ListFeatures`, streams the whole [`FeatureStore`] to the caller one feature
//! at a time with a fixed delay in between.
//!
//! ## Responsibilities
//!
//! - Build a per-call cancellation context and response sink.
//! - Spawn one delivery task per call running [`deliver`].
//! - Track in-flight streams and support graceful shutdown.
//! - Record telemetry for every finished stream.

use crate::server::{
    config::ServerConfig,
    store::FeatureStore,
    streaming::{
        context::{CallContext, GRPC_TIMEOUT_HEADER, parse_grpc_timeout},
        deliver::{Outcome, deliver},
        sink::{FeatureStream, ResponseSink, SinkError},
    },
    telemetry::{
        decrement_streams_inflight, increment_features_sent, increment_requests,
        increment_streams_inflight, record_stream_duration, record_stream_outcome,
    },
};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use route_guide_core::{
    Error,
    proto::{ListFeaturesRequest, route_guide_server::RouteGuide},
};
use std::sync::Arc;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::Instrument;

/// How long shutdown waits for cancelled streams to wind down.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// How often shutdown re-checks the in-flight count.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// State shared between the service clones tonic hands to each connection.
struct StreamState {
    inflight: AtomicUsize,
    shutting_down: AtomicBool,
    shutdown_token: CancellationToken,
}

/// Keeps a stream counted as in flight until the delivery task drops it.
struct InflightGuard {
    state: Arc<StreamState>,
}

impl InflightGuard {
    fn new(state: Arc<StreamState>) -> Self {
        state.inflight.fetch_add(1, Ordering::SeqCst);
        increment_streams_inflight();
        Self { state }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.state.inflight.fetch_sub(1, Ordering::SeqCst);
        decrement_streams_inflight();
    }
}

/// gRPC service streaming the feature dataset at a fixed pace.
///
/// Cloning is cheap: the store and the stream bookkeeping are shared.
#[derive(Clone)]
pub struct RouteGuideService {
    store: FeatureStore,
    config: ServerConfig,
    state: Arc<StreamState>,
}

impl RouteGuideService {
    pub fn new(store: FeatureStore, config: ServerConfig) -> Self {
        debug_assert!(!store.is_empty());
        Self {
            store,
            config,
            state: Arc::new(StreamState {
                inflight: AtomicUsize::new(0),
                shutting_down: AtomicBool::new(false),
                shutdown_token: CancellationToken::new(),
            }),
        }
    }

    /// Number of streams whose delivery task has not finished yet.
    pub fn streams_inflight(&self) -> usize {
        self.state.inflight.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.shutting_down.load(Ordering::SeqCst)
    }

    /// Gracefully stops streaming.
    ///
    /// 1. New calls are refused with `UNAVAILABLE`.
    /// 2. In-flight streams get up to `shutdown_timeout` to finish on their
    ///    own.
    /// 3. The shutdown token is cancelled, and whatever is left gets a short
    ///    grace period to stop.
    ///
    /// Returns the number of streams still running afterwards.
    pub async fn shutdown(&self) -> usize {
        tracing::info!("Refusing new requests");
        self.state.shutting_down.store(true, Ordering::SeqCst);

        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight()
        );
        if self.wait_for_drain(self.config.shutdown_timeout).await {
            tracing::debug!("All in-flight streams drained");
            self.state.shutdown_token.cancel();
            return 0;
        }

        tracing::warn!(
            "Graceful drain timed out ({} streams still active), cancelling",
            self.streams_inflight()
        );
        self.state.shutdown_token.cancel();

        if !self.wait_for_drain(CANCEL_GRACE).await {
            tracing::error!(
                "{} streams did not stop after cancellation",
                self.streams_inflight()
            );
        }
        self.streams_inflight()
    }

    async fn wait_for_drain(&self, limit: Duration) -> bool {
        timeout(limit, async {
            while self.streams_inflight() > 0 {
                sleep(DRAIN_POLL).await;
            }
        })
        .await
        .is_ok()
    }
}

#[tonic::async_trait]
impl RouteGuide for RouteGuideService {
    type ListFeaturesStream = FeatureStream;

    /// Streams every feature of the store in order.
    ///
    /// The response is returned right away; a spawned task feeds it. The
    /// stream ends once that task has stopped, either cleanly (all features
    /// sent, or the call was cancelled) or with `UNAVAILABLE` when the client
    /// stopped reading for longer than the send timeout.
    #[tracing::instrument(skip_all, fields(features = self.store.len()))]
    async fn list_features(
        &self,
        req: Request<ListFeaturesRequest>,
    ) -> Result<Response<Self::ListFeaturesStream>, Status> {
        // Counted before the flag is read, so a concurrent `shutdown` either
        // refuses this call or waits for it.
        let guard = InflightGuard::new(Arc::clone(&self.state));
        if self.is_shutting_down() {
            return Err(Error::ServiceShutdown.into());
        }

        let deadline = req
            .metadata()
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout);

        increment_requests();

        let ctx = CallContext::new(&self.state.shutdown_token, deadline);
        let (mut sink, stream) =
            ResponseSink::channel(self.config.stream_buffer_size, self.config.send_timeout);
        let features = self.store.shared();
        let interval = self.config.send_interval;

        let fut = async move {
            let start = Instant::now();
            let watcher = ctx.watch(&sink);

            let delivery = deliver(&features, &mut sink, ctx.token(), interval).await;
            let cancel_reason = watcher.stop().await;

            increment_features_sent(delivery.sent as u64);
            record_stream_outcome(delivery.label());
            record_stream_duration(start.elapsed().as_millis() as f64);

            if let Outcome::SendFailed(SinkError::Stalled { after }) = delivery.outcome {
                let err = Error::SendStalled {
                    after_ms: after.as_millis() as u64,
                };
                sink.fail(err.into());
            }

            match cancel_reason {
                Some(reason) => tracing::info!(
                    sent = delivery.sent,
                    "ListFeatures finished ({reason})"
                ),
                None => tracing::info!(sent = delivery.sent, "ListFeatures finished"),
            }

            drop(guard);
        };
        tokio::spawn(fut.instrument(tracing::info_span!("streaming")));

        Ok(Response::new(stream))
    }
}
