//! Per-call cancellation.
//!
//! A [`CallContext`] owns the cancellation token of exactly one streaming call.
//! The token is a child of the service-wide shutdown token and is additionally
//! raised by a watcher when the client disconnects or the deadline it sent in
//! the `grpc-timeout` header passes.

use super::sink::ResponseSink;
use core::{fmt, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

/// Header carrying the client's deadline, relative to the moment it was sent.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Parses a `grpc-timeout` header value: at most eight ASCII digits followed
/// by one unit character (`H`, `M`, `S`, `m`, `u`, `n`).
///
/// Returns `None` for anything else, in which case the call simply runs
/// without a deadline.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

/// Why a call's token was raised by its watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Disconnected,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Disconnected => write!(f, "client disconnected"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Cancellation state owned by a single streaming call.
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Creates a context whose token is cancelled along with `parent`.
    pub fn new(parent: &CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token: parent.child_token(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Spawns a task raising the token when the client behind `sink` goes
    /// away or the deadline passes, whichever comes first.
    ///
    /// The returned [`Watcher`] holds a sender clone, so it must be stopped
    /// once delivery is over or the response stream would never end.
    pub fn watch(&self, sink: &ResponseSink) -> Watcher {
        let tx = sink.sender().clone();
        let token = self.token.clone();
        let deadline = self.deadline;

        let handle = tokio::spawn(async move {
            let expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => core::future::pending().await,
                }
            };

            let reason = tokio::select! {
                () = token.cancelled() => return None,
                () = tx.closed() => CancelReason::Disconnected,
                () = expired => CancelReason::DeadlineExceeded,
            };

            tracing::info!("Cancelling stream: {reason}");
            token.cancel();
            Some(reason)
        });

        Watcher { handle }
    }
}

/// Handle to the task spawned by [`CallContext::watch`].
pub struct Watcher {
    handle: JoinHandle<Option<CancelReason>>,
}

impl Watcher {
    /// Stops the watcher and waits until it has released its sender clone.
    /// Returns the reason it cancelled the call, if it did.
    pub async fn stop(self) -> Option<CancelReason> {
        self.handle.abort();
        self.handle.await.ok().flatten()
    }
}
