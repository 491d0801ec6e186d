// Logging setup

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
	#[default]
	Plain,
	Json,
}

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns false when a subscriber is already installed, which makes it safe
/// to call from every test and from embedders that set up their own.
pub fn init(format: LogFormat) -> bool {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);
	let result = match format {
		LogFormat::Plain => registry
			.with(tracing_subscriber::fmt::layer().with_target(true))
			.try_init(),
		LogFormat::Json => registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.flatten_event(true)
					.with_current_span(true)
					.with_span_list(false),
			)
			.try_init(),
	};
	result.is_ok()
}
