//! Paced, cancellable delivery of features into a response stream.
//!
//! ## Structure
//!
//! - [`deliver`] - The emission loop: send, then wait or cancel, repeat.
//! - [`sink`] - The [`FeatureSink`](sink::FeatureSink) seam and the tonic
//!   channel-backed implementation.
//! - [`context`] - Per-call cancellation token, client deadline parsing, and
//!   the disconnect/deadline watcher.

pub mod context;
pub mod deliver;
pub mod sink;
