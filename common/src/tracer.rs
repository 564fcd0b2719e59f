use thiserror::Error;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("Tracing Subscriber Already Set: {0}")]
    AlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),
}

#[derive(Default)]
pub struct TracerOptions {
    /// Emit ANSI colour codes in the log output.
    pub ansi: bool,
}

/// Installs the stdout tracer for a binary.
/// Log levels are taken from the `RUST_LOG` environment variable.
pub struct TracerEngine;

impl TracerEngine {
    /// Initialises the stdout tracer for the calling binary.
    /// #Arguments
    /// * `options` - The caller-specified instance of TracerOptions.
    /// #Returns
    /// An instance of TracerEngine, or an error if a global subscriber was already installed.
    pub fn new(options: TracerOptions) -> Result<Self, TracerError> {
        let stdout_tracer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(options.ansi);

        // This filter is applied to the stdout tracer
        let log_filter = EnvFilter::from_default_env();

        let subscriber =
            tracing_subscriber::Registry::default().with(stdout_tracer.with_filter(log_filter));

        tracing::subscriber::set_global_default(subscriber)?;
        Ok(Self)
    }
}
