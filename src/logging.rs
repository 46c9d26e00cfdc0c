use anyhow::Context as _;

/// Directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "info,tower_http=debug";

pub fn init() -> anyhow::Result<()> {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn build_filter(raw: Option<&str>) -> anyhow::Result<tracing_subscriber::EnvFilter> {
    raw.filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| tracing_subscriber::EnvFilter::try_new(raw).ok())
        .map(Ok)
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::try_new(DEFAULT_DIRECTIVE))
        .context("build log filter")
}
