//! Logging, tracing and metrics setup for spool.
//!
//! Logs always go to stderr so that dry-run output on stdout stays clean.
//! OpenTelemetry export over OTLP is off unless `OTEL_SDK_DISABLED=false`.
use std::{borrow::Cow, time::Duration};

use opentelemetry::{InstrumentationScope, global, trace::TracerProvider as _};
use opentelemetry_otlp::{ExporterBuildError, MetricExporter, SpanExporter};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    trace::SdkTracerProvider,
};
use snafu::{ResultExt, Snafu};
use tracing::{Subscriber, warn};
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
    util::TryInitError,
};

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

pub use crate::format::SpoolFormat;

mod format;

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";
const DEFAULT_DIRECTIVE: &str = "info";
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum ObservabilityError {
    #[snafu(display("Failed to build exporter"))]
    Exporter { source: ExporterBuildError },
    #[snafu(display("Failed to install the global subscriber"))]
    Install { source: TryInitError },
}

/// How log lines are written to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One compact, colored line per event.
    #[default]
    Human,
    /// One json object per event.
    Json,
}

impl LogFormat {
    /// Reads `RUST_LOG_FORMAT`. Only `json` selects [`LogFormat::Json`].
    pub fn from_env() -> Self {
        match std::env::var(RUST_LOG_FORMAT) {
            Ok(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Human,
        }
    }
}

/// Keeps the OpenTelemetry providers alive.
///
/// Dropping the guard flushes and shuts down the exporters.
#[must_use = "dropping the guard stops telemetry export"]
pub struct ObservabilityGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

/// Returns the global meter with the given name.
///
/// Instruments created before [`init_observability`] runs are no-ops.
pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Installs the global subscriber and meter provider.
pub fn init_observability(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<ObservabilityGuard, ObservabilityError> {
    let package_name = package_name.into();
    let package_version = package_version.into();
    let export = otel_export_enabled();

    let resource = Resource::builder()
        .with_service_name(package_name.clone())
        .with_attribute(KeyValue::new("service.version", package_version.clone()))
        .build();

    let tracer_provider = tracer_provider(resource.clone(), export)?;
    let meter_provider = meter_provider(resource, export)?;
    global::set_meter_provider(meter_provider.clone());

    let scope = InstrumentationScope::builder(package_name)
        .with_version(package_version)
        .build();
    let tracer = tracer_provider.tracer_with_scope(scope);

    let otel_layer = env_filter()
        .and_then(MetricsLayer::new(meter_provider.clone()))
        .and_then(tracing_opentelemetry::layer().with_tracer(tracer));

    tracing_subscriber::registry()
        .with(stderr_layer(LogFormat::from_env()))
        .with(otel_layer)
        .try_init()
        .context(InstallSnafu {})?;

    Ok(ObservabilityGuard {
        tracer_provider,
        meter_provider,
    })
}

// The otel sdk ignores OTEL_SDK_DISABLED, and we default to disabled.
fn otel_export_enabled() -> bool {
    std::env::var(OTEL_SDK_DISABLED)
        .map(|v| v == "false")
        .unwrap_or(false)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn stderr_layer<S>(format: LogFormat) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => layer
            .with_ansi(false)
            .json()
            .with_filter(env_filter())
            .boxed(),
        LogFormat::Human => layer
            .with_ansi(true)
            .event_format(SpoolFormat::default())
            .with_filter(env_filter())
            .boxed(),
    }
}

fn tracer_provider(
    resource: Resource,
    export: bool,
) -> Result<SdkTracerProvider, ObservabilityError> {
    let mut builder = SdkTracerProvider::builder().with_resource(resource);

    if export {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;
        builder = builder.with_batch_exporter(exporter);
    }

    Ok(builder.build())
}

fn meter_provider(resource: Resource, export: bool) -> Result<SdkMeterProvider, ObservabilityError> {
    let mut builder = SdkMeterProvider::builder().with_resource(resource);

    if export {
        let exporter = MetricExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;
        let reader = PeriodicReader::builder(exporter)
            .with_interval(METRICS_EXPORT_INTERVAL)
            .build();
        builder = builder.with_reader(reader);
    }

    Ok(builder.build())
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            warn!(error = %err, "failed to shut down tracer provider");
        }
        if let Err(err) = self.meter_provider.shutdown() {
            warn!(error = %err, "failed to shut down meter provider");
        }
    }
}
