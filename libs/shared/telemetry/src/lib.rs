//! Structured logging setup shared by the engine binary and its sibling
//! tools: an env-filterable subscriber (compact in development, JSON in
//! release) and a panic hook that logs through `tracing` instead of
//! `stderr` so a crash on any task is still captured by log shipping.

use std::panic;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialises the global tracing subscriber for `service_name` and
/// installs a panic hook that logs the panic location and message before
/// the default hook runs.
///
/// # Panics
/// Panics if a global subscriber has already been installed.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if cfg!(debug_assertions) { "debug" } else { "info" };
        format!("{service_name}={level},tower_http=warn").into()
    });

    if cfg!(debug_assertions) {
        tracing_subscriber::registry().with(filter).with(fmt::layer().compact().with_target(false)).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json().flatten_event(true)).init();
    }

    let service = service_name.to_string();
    panic::set_hook(Box::new(move |info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_else(|| "unknown".to_string());
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown panic payload");
        tracing::error!(service = %service, location = %location, "panic: {message}");
    }));

    tracing::info!(service = service_name, "tracing initialised");
}
