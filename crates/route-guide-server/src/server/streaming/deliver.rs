use super::sink::{FeatureSink, SinkError};
use core::{fmt, time::Duration};
use route_guide_core::proto::Feature;
use tokio_util::sync::CancellationToken;

/// Where in the emission loop a cancellation was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPoint {
    /// The signal was already raised when the next send was due.
    BeforeSend,
    /// The sink reported that the client went away while sending.
    DuringSend,
    /// The signal fired during the paced wait between two sends.
    DuringWait,
}

impl fmt::Display for CancelPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelPoint::BeforeSend => write!(f, "before send"),
            CancelPoint::DuringSend => write!(f, "during send"),
            CancelPoint::DuringWait => write!(f, "during wait"),
        }
    }
}

/// How a delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every feature was sent.
    Completed,
    /// Stopped early because the call was cancelled. Not an error.
    Canceled(CancelPoint),
    /// Stopped early because a send failed for a reason other than the client
    /// going away.
    SendFailed(SinkError),
}

/// Result of [`deliver`]: the terminal outcome and the number of features
/// that were handed to the sink successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub sent: usize,
    pub outcome: Outcome,
}

impl Delivery {
    pub fn label(&self) -> &'static str {
        match self.outcome {
            Outcome::Completed => "completed",
            Outcome::Canceled(_) => "canceled",
            Outcome::SendFailed(_) => "send_failed",
        }
    }
}

/// Streams `features` into `sink` one at a time, waiting `interval` between
/// consecutive sends.
///
/// The loop runs inline and this function returns only once it has stopped,
/// for one of three reasons:
///
/// - every feature was sent ([`Outcome::Completed`]);
/// - `cancel` was raised before a send or during a wait, or the sink reported
///   a disconnect ([`Outcome::Canceled`]);
/// - the sink failed for any other reason ([`Outcome::SendFailed`]).
///
/// No send is attempted after the loop decided to stop, and no wait follows
/// the last feature. Cancellation never interrupts a send that is already in
/// progress; it is observed at the next check.
pub async fn deliver<S: FeatureSink>(
    features: &[Feature],
    sink: &mut S,
    cancel: &CancellationToken,
    interval: Duration,
) -> Delivery {
    let mut sent = 0;

    for (i, feature) in features.iter().enumerate() {
        if cancel.is_cancelled() {
            return finish(sent, Outcome::Canceled(CancelPoint::BeforeSend));
        }

        if let Err(e) = sink.send(feature.clone()).await {
            let outcome = if e.is_disconnect() {
                Outcome::Canceled(CancelPoint::DuringSend)
            } else {
                Outcome::SendFailed(e)
            };
            return finish(sent, outcome);
        }
        sent += 1;

        tracing::debug!(
            index = i,
            name = %feature.name,
            location = %feature.point(),
            "Feature sent"
        );

        if sent == features.len() {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return finish(sent, Outcome::Canceled(CancelPoint::DuringWait));
            }
            () = tokio::time::sleep(interval) => {}
        }
    }

    finish(sent, Outcome::Completed)
}

fn finish(sent: usize, outcome: Outcome) -> Delivery {
    match &outcome {
        Outcome::Completed => tracing::info!(sent, "Delivery completed"),
        Outcome::Canceled(point) => tracing::info!(sent, "Delivery canceled {point}"),
        Outcome::SendFailed(e) => tracing::warn!(sent, "Delivery failed: {e}"),
    }
    Delivery { sent, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use route_guide_core::proto::Point;
    use tokio::time::Instant;

    const INTERVAL: Duration = Duration::from_millis(100);

    /// Sink recording what it received and when. Optionally fails the n-th
    /// send (1-based) with the given error.
    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<(String, Instant)>,
        attempts: usize,
        fail_on: Option<(usize, SinkError)>,
        cancel_on_send: Option<(usize, CancellationToken)>,
    }

    impl FeatureSink for RecordingSink {
        async fn send(&mut self, feature: Feature) -> Result<(), SinkError> {
            self.attempts += 1;
            if let Some((n, token)) = &self.cancel_on_send {
                if *n == self.attempts {
                    token.cancel();
                }
            }
            if let Some((n, err)) = &self.fail_on {
                if *n == self.attempts {
                    return Err(err.clone());
                }
            }
            self.sent.push((feature.name, Instant::now()));
            Ok(())
        }
    }

    impl RecordingSink {
        fn names(&self) -> Vec<&str> {
            self.sent.iter().map(|(name, _)| name.as_str()).collect()
        }
    }

    fn features(names: &[&str]) -> Vec<Feature> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Feature {
                name: name.to_string(),
                location: Some(Point {
                    latitude: 400_000_000 + i as i32,
                    longitude: -740_000_000,
                }),
            })
            .collect()
    }

    fn cancel_after(token: &CancellationToken, after: Duration) {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn sends_everything_in_order_with_pacing() {
        let features = features(&["A", "B", "C"]);
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let start = Instant::now();
        let delivery = deliver(&features, &mut sink, &cancel, INTERVAL).await;
        let elapsed = start.elapsed();

        assert_eq!(
            delivery,
            Delivery {
                sent: 3,
                outcome: Outcome::Completed
            }
        );
        assert_eq!(sink.names(), ["A", "B", "C"]);
        assert_eq!(sink.attempts, 3);
        assert!(elapsed >= 2 * INTERVAL);
        // No trailing wait after the last feature.
        assert!(elapsed < 3 * INTERVAL);

        for pair in sink.sent.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= INTERVAL);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_sequence_completes_immediately() {
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let delivery = deliver(&[], &mut sink, &cancel, INTERVAL).await;
        assert_eq!(delivery.outcome, Outcome::Completed);
        assert_eq!(delivery.sent, 0);
        assert_eq!(sink.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_sends_nothing() {
        let features = features(&["A", "B", "C"]);
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let delivery = deliver(&features, &mut sink, &cancel, INTERVAL).await;
        assert_eq!(delivery.outcome, Outcome::Canceled(CancelPoint::BeforeSend));
        assert_eq!(delivery.sent, 0);
        assert_eq!(sink.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_first_wait_stops_after_one() {
        let features = features(&["A", "B", "C"]);
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(50));

        let start = Instant::now();
        let delivery = deliver(&features, &mut sink, &cancel, INTERVAL).await;

        assert_eq!(delivery.outcome, Outcome::Canceled(CancelPoint::DuringWait));
        assert_eq!(delivery.sent, 1);
        assert_eq!(sink.names(), ["A"]);
        // The wait was cut short rather than running to the full interval.
        assert!(start.elapsed() < INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_second_wait_stops_after_two() {
        let features = features(&["A", "B", "C"]);
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(150));

        let delivery = deliver(&features, &mut sink, &cancel, INTERVAL).await;

        assert_eq!(delivery.outcome, Outcome::Canceled(CancelPoint::DuringWait));
        assert_eq!(sink.names(), ["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_kth_wait_sends_exactly_k() {
        let names: Vec<String> = (0..8).map(|i| format!("F{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let features = features(&names);

        for k in 1..features.len() {
            let mut sink = RecordingSink::default();
            let cancel = CancellationToken::new();
            // Halfway through the k-th wait.
            cancel_after(&cancel, INTERVAL * (k as u32 - 1) + INTERVAL / 2);

            let delivery = deliver(&features, &mut sink, &cancel, INTERVAL).await;
            assert_eq!(delivery.sent, k, "cancelled in wait {k}");
            assert_eq!(sink.attempts, k);
            assert_eq!(delivery.outcome, Outcome::Canceled(CancelPoint::DuringWait));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_stops_without_further_attempts() {
        let features = features(&["A", "B", "C"]);
        let after = Duration::from_secs(1);
        let mut sink = RecordingSink {
            fail_on: Some((2, SinkError::Stalled { after })),
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let delivery = deliver(&features, &mut sink, &cancel, INTERVAL).await;

        assert_eq!(
            delivery.outcome,
            Outcome::SendFailed(SinkError::Stalled { after })
        );
        assert_eq!(delivery.sent, 1);
        assert_eq!(sink.names(), ["A"]);
        assert_eq!(sink.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_send_counts_as_cancellation() {
        let features = features(&["A", "B", "C"]);
        let mut sink = RecordingSink {
            fail_on: Some((3, SinkError::Disconnected)),
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let delivery = deliver(&features, &mut sink, &cancel, INTERVAL).await;

        assert_eq!(delivery.outcome, Outcome::Canceled(CancelPoint::DuringSend));
        assert_eq!(delivery.sent, 2);
        assert_eq!(sink.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn classification_ignores_token_state() {
        // The token is raised inside the failing send, yet a non-disconnect
        // error is still reported as a send failure.
        let features = features(&["A", "B"]);
        let cancel = CancellationToken::new();
        let after = Duration::from_millis(10);
        let mut sink = RecordingSink {
            fail_on: Some((1, SinkError::Stalled { after })),
            cancel_on_send: Some((1, cancel.clone())),
            ..Default::default()
        };

        let delivery = deliver(&features, &mut sink, &cancel, INTERVAL).await;
        assert_eq!(
            delivery.outcome,
            Outcome::SendFailed(SinkError::Stalled { after })
        );
        assert_eq!(delivery.sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_raised_mid_send_is_seen_at_the_next_wait() {
        let features = features(&["A", "B", "C"]);
        let cancel = CancellationToken::new();
        let mut sink = RecordingSink {
            cancel_on_send: Some((2, cancel.clone())),
            ..Default::default()
        };

        let delivery = deliver(&features, &mut sink, &cancel, INTERVAL).await;

        // The in-flight send of B is not preempted.
        assert_eq!(sink.names(), ["A", "B"]);
        assert_eq!(delivery.outcome, Outcome::Canceled(CancelPoint::DuringWait));
    }

    #[test]
    fn labels_name_the_outcome() {
        let cases = [
            (Outcome::Completed, "completed"),
            (Outcome::Canceled(CancelPoint::DuringWait), "canceled"),
            (Outcome::SendFailed(SinkError::Disconnected), "send_failed"),
        ];
        for (outcome, label) in cases {
            assert_eq!(Delivery { sent: 0, outcome }.label(), label);
        }
    }
}
