use tracing_subscriber::{util::TryInitError, EnvFilter};

/// Used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVES: &str = "collector_service=info,rust_client=info,rumqttc=warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init_tracing() -> Result<(), TryInitError> {
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .finish()
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        for directive in DEFAULT_DIRECTIVES.split(',') {
            assert!(directive.parse::<tracing_subscriber::filter::Directive>().is_ok(), "{directive}");
        }
    }
}
