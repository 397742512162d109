//! Error types for the feature streaming service.
//!
//! This module defines the central `Error` enum for per-call failures and
//! implements `From<Error>` for `tonic::Status` so failures reach clients with
//! an appropriate gRPC status code.
//!
//! Cancellation (client disconnect, passed deadline, shutdown of an in-flight
//! stream) is not an error: those streams end with an OK status.
//!
//! ## Error Cases
//! - `SendStalled`: The client stopped reading and the response buffer stayed
//!   full for longer than the configured send timeout.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use tonic::Status;

/// Unified error type for the feature streaming service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The response buffer had no capacity for `after_ms` milliseconds.
    #[error("Client stopped consuming the stream for {after_ms}ms")]
    SendStalled { after_ms: u64 },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::SendStalled { .. } => Status::unavailable(err.to_string()),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn maps_errors_to_grpc_codes() {
        let cases = [
            (Error::SendStalled { after_ms: 250 }, Code::Unavailable),
            (Error::ServiceShutdown, Code::Unavailable),
        ];

        for (err, code) in cases {
            let status = Status::from(err.clone());
            assert_eq!(status.code(), code, "unexpected code for {err:?}");
        }
    }

    #[test]
    fn stalled_status_mentions_duration() {
        let status = Status::from(Error::SendStalled { after_ms: 1500 });
        assert!(status.message().contains("1500ms"));
    }
}
