use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Filter comes from `RUST_LOG` (default `info`); output goes to
/// stderr so stdout stays free for command output.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let res = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    res.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
