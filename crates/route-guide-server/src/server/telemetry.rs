//! # Telemetry Features
//!
//! Console logging through `tracing_subscriber::fmt` is always on and filtered
//! by `RUST_LOG` (default `info`). OpenTelemetry export is opt-in.
//!
//! ## Feature matrix
//!
//! - `traces`: Exports spans through `tracing-opentelemetry`.
//! - `metrics`: Exports stream counters and histograms.
//! - `otlp`: OTLP/gRPC exporter. Endpoint, headers and timeout come from the
//!   standard `OTEL_EXPORTER_OTLP_*` environment variables.
//! - `stdout`: Prints exported spans/metrics to stdout.
//!
//! Exporters require at least one of `traces` or `metrics`.
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
//!     cargo run --features traces,metrics,otlp
//! ```

#[cfg(all(feature = "otlp", not(any(feature = "traces", feature = "metrics"))))]
compile_error!("The 'otlp' feature requires at least one of 'traces' or 'metrics' to be enabled.");

#[cfg(all(feature = "stdout", not(any(feature = "traces", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'traces' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "traces")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "traces")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "traces")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(any(feature = "metrics", feature = "traces"))]
const SERVICE_NAME: &str = "route-guide";

pub struct TelemetryProviders {
    #[cfg(feature = "traces")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down the exporters. Errors are printed to stderr since
    /// the subscriber may already be unusable at this point.
    pub fn shutdown(self) {
        #[cfg(feature = "traces")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "traces")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "traces")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "traces"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "traces")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "traces")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "traces"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();
        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .build()
            .context("failed to build metrics exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "traces")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_batch_exporter(opentelemetry_stdout::SpanExporter::default());

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()
            .context("failed to build span exporter")?;
        builder.with_batch_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAMS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAM_OUTCOMES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAM_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static FEATURES_SENT: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Total ListFeatures calls accepted")
            .build(),
    );

    let _ = STREAMS_INFLIGHT.set(
        meter
            .i64_up_down_counter("streams_inflight")
            .with_description("Feature streams currently being delivered")
            .build(),
    );

    let _ = STREAM_OUTCOMES.set(
        meter
            .u64_counter("stream_outcomes")
            .with_description("Finished streams by outcome")
            .build(),
    );

    let _ = STREAM_DURATION_MS.set(
        meter
            .f64_histogram("stream_duration")
            .with_unit("ms")
            .with_description("End-to-end stream duration")
            .build(),
    );

    let _ = FEATURES_SENT.set(
        meter
            .u64_counter("features_sent")
            .with_description("Features handed to response streams")
            .build(),
    );
}

// The helpers below compile to no-ops when metrics are disabled.

#[cfg(feature = "metrics")]
pub fn increment_requests() {
    if let Some(counter) = REQUESTS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests() {}

#[cfg(feature = "metrics")]
pub fn increment_streams_inflight() {
    if let Some(counter) = STREAMS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_streams_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_streams_inflight() {
    if let Some(counter) = STREAMS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_streams_inflight() {}

#[cfg(feature = "metrics")]
pub fn record_stream_outcome(outcome: &'static str) {
    if let Some(counter) = STREAM_OUTCOMES.get() {
        counter.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_stream_outcome(_outcome: &'static str) {}

#[cfg(feature = "metrics")]
pub fn record_stream_duration(duration_ms: f64) {
    if let Some(histogram) = STREAM_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_stream_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn increment_features_sent(count: u64) {
    if let Some(counter) = FEATURES_SENT.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_features_sent(_count: u64) {}
