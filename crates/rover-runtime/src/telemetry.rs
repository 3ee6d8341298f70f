//! Tracing pipeline initialisation for the rover.
//!
//! Call [`init_tracing`] once at process startup. Loop threads run inside
//! `deliberative_loop` / `reactive_loop` spans tagged with the scheduler's
//! `run_id`, and phase enter/exit events are emitted at `trace` level, so
//! `RUST_LOG=rover_runtime=trace` shows every strategy call.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set the OTLP HTTP exporter is activated. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `ROVER_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = rover_runtime::telemetry::init_tracing("rover");
//! rover_runtime::telemetry::install_panic_hook();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::phase::panic_message;

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "ROVER_LOG_FORMAT";

/// Name prefix shared by the scheduler's loop threads.
pub const LOOP_THREAD_PREFIX: &str = "rover-";

/// Initialise the global `tracing` subscriber with an optional OTLP exporter.
///
/// Falls back to a plain console formatter when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is absent. If a global subscriber is
/// already installed (e.g. by a test harness) the existing one is kept.
///
/// The returned [`TracerProviderGuard`] **must** be held for the lifetime of
/// the process; dropping it flushes pending spans.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var(LOG_FORMAT_ENV).as_deref() == Ok("json");

    let provider = build_provider(service_name);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("rover")));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(use_json.then(|| tracing_subscriber::fmt::layer().json().with_thread_names(true)))
        .with((!use_json).then(|| tracing_subscriber::fmt::layer().compact().with_thread_names(true)))
        .try_init();
    if let Err(e) = installed {
        eprintln!("[rover] tracing subscriber already installed: {e}");
    }

    TracerProviderGuard(provider)
}

/// Route panics raised on loop threads through `tracing` instead of stderr.
///
/// Strategy panics are caught and reported through the error sink, but the
/// default hook still prints a message for each one before the unwind is
/// caught. A strategy that panics on every iteration would flood stderr at
/// loop speed. With this hook installed, panics on threads named with
/// [`LOOP_THREAD_PREFIX`] become a single `error!` event and go through the
/// subscriber's filter. Panics on any other thread reach the previous hook
/// unchanged.
///
/// Call once, after [`init_tracing`].
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let current = std::thread::current();
        let Some(name) = current.name().filter(|n| is_loop_thread(n)) else {
            previous(info);
            return;
        };
        let location = info
            .location()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        error!(
            thread = name,
            location = %location,
            message = %panic_message(info.payload()),
            "panic on loop thread"
        );
    }));
}

fn is_loop_thread(name: &str) -> bool {
    name.starts_with(LOOP_THREAD_PREFIX)
}

/// RAII guard that shuts down the OTel [`SdkTracerProvider`] on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` when spans are being exported over OTLP.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[rover] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// Build an [`SdkTracerProvider`] when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Returns `None` when the variable is absent or the exporter cannot be
/// initialised (the error goes to stderr).
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[rover] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // The simple exporter exports synchronously, which suits the loop threads:
    // there is no async runtime in this process.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_provider_returns_none_without_endpoint() {
        // SAFETY: no other test in this crate touches this variable.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("test-service").is_none());
    }

    #[test]
    fn guard_without_provider_drops_quietly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }

    #[test]
    fn only_scheduler_threads_count_as_loop_threads() {
        assert!(is_loop_thread("rover-deliberative"));
        assert!(is_loop_thread("rover-reactive"));
        assert!(!is_loop_thread("main"));
        assert!(!is_loop_thread("telemetry::tests::some_test"));
    }

    fn blow_up() {
        panic!("strategy blew up");
    }

    #[test]
    fn hooked_loop_thread_panic_is_still_caught() {
        install_panic_hook();
        let caught = std::thread::Builder::new()
            .name(format!("{LOOP_THREAD_PREFIX}hook-test"))
            .spawn(|| std::panic::catch_unwind(blow_up).is_err())
            .expect("spawn")
            .join()
            .expect("thread does not unwind past catch_unwind");
        assert!(caught);

        let outer = std::thread::spawn(blow_up).join();
        assert!(outer.is_err());
    }

    #[test]
    fn init_twice_keeps_first_subscriber() {
        // SAFETY: see above.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        let _first = init_tracing("rover-test");
        let _second = init_tracing("rover-test");
    }
}
