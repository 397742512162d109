//! gRPC service implementation.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`RouteGuideService`), in-flight
//!   stream accounting and graceful shutdown.

pub mod handler;
