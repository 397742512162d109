//! Shared protocol types and error definitions for the route guide service.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its mapping onto [`tonic::Status`].
//! - [`proto`] - Generated protobuf messages and `RouteGuide` service traits.
//! - [`types`] - Coordinate conventions and helpers on the generated types.

pub mod error;
pub mod types;

pub use error::Error;

/// gRPC service and message definitions generated from
/// `proto/route_guide.proto`.
///
/// ## Service
///
/// - `ListFeatures` - Streams every known [`Feature`](proto::Feature) in
///   dataset order at a fixed pace.
///
/// ## Messages
///
/// - [`Point`](proto::Point) - Latitude/longitude scaled by 1e7.
/// - [`Feature`](proto::Feature) - A named location; an empty name denotes
///   "no feature".
/// - [`ListFeaturesRequest`](proto::ListFeaturesRequest) - Empty request.
pub mod proto {
    tonic::include_proto!("routeguide");
}
