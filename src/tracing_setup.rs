use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable console output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Initialize logging on stderr so stdout stays reserved for results.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(true).with_span_list(false))
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(env_filter)
            .with(fmt_layer.compact())
            .try_init(),
    };
    installed.wrap_err("Failed to install tracing subscriber")?;

    tracing::debug!("wafctl logging initialized ({format:?}, level {level})");
    Ok(())
}

/// Create a span grouping everything done for one site
pub fn create_run_span(command: &str, site: Option<&str>) -> tracing::Span {
    tracing::info_span!(
        "run",
        command = command,
        site = site.unwrap_or("-"),
    )
}
