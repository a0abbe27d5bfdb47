//! Process-wide logging setup. Cross-cutting concerns (log level, output
//! format) live here as explicit init/teardown rather than ambient globals;
//! everything else in the pipeline threads a correlation id and request-scoped
//! fields through instead of reaching back into this module.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// A guard that must be kept alive for the lifetime of the process; dropping
/// it flushes any buffered log output.
pub struct LogFlush(#[allow(dead_code)] Option<tracing_appender::non_blocking::WorkerGuard>);

pub fn setup_logging() -> LogFlush {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
	let fmt_layer = tracing_subscriber::fmt::layer()
		.with_target(true)
		.with_writer(writer);
	let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);
	if registry.try_init().is_err() {
		// A subscriber was already installed (e.g. in tests); not fatal.
		tracing::debug!("tracing subscriber already initialized");
	}
	LogFlush(Some(guard))
}
