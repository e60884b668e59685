use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// `pretty` selects multi-line human output; otherwise one compact line per event.
pub fn init(level: &str, pretty: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},actix_web=info")));
    let registry = tracing_subscriber::registry().with(filter);
    let fmt = tracing_subscriber::fmt::layer();
    if pretty {
        registry.with(fmt.pretty()).try_init()
    } else {
        registry.with(fmt.compact()).try_init()
    }
}
