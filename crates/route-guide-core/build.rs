/// Builds the gRPC client and server code for `route_guide.proto` using
/// `tonic-prost-build`.
///
/// The generated module exposes the `RouteGuide` service traits together with
/// the `Feature`, `Point` and `ListFeaturesRequest` messages.
///
/// # Snapshot Deserialization
///
/// `Feature` and `Point` additionally derive `serde::Deserialize` with
/// container-level `#[serde(default)]`, so the server can read its JSON dataset
/// snapshot straight into the wire types:
///
/// - Missing fields fall back to their protobuf defaults
/// - Unknown fields are ignored
/// - Type mismatches are reported as deserialization errors
///
/// # Files and Paths
///
/// - Proto file: `proto/route_guide.proto`
/// - Includes: `proto/`
///
/// # Output
///
/// ```rust,ignore
/// pub mod routeguide {
///     tonic::include_proto!("routeguide");
/// }
/// ```
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/route_guide.proto");

    let mut config = tonic_prost_build::Config::new();

    for message in [".routeguide.Feature", ".routeguide.Point"] {
        config
            .type_attribute(message, "#[derive(serde::Deserialize)]")
            .type_attribute(message, "#[serde(default)]");
    }

    tonic_prost_build::configure().compile_with_config(
        config,
        &["proto/route_guide.proto"],
        &["proto"],
    )?;

    Ok(())
}
