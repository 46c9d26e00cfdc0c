use std::time::Duration;

use anyhow::Context as _;

pub const DEFAULT_ORIGIN: &str = "http://flibusta.is";
pub const ROOT_LOCATION: &str = "/opds";
pub const ROOT_LABEL: &str = "Главная";
pub const NEXT_REL: &str = "next";
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 200;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_METADATA_LABELS: &[&str] = &["Год издания", "Формат", "Язык", "Размер"];
pub const DEFAULT_HIDDEN_TITLES: &[&str] = &["Моя полка"];

/// Tunables shared by the parser, summarizer and view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Remote catalog origin stripped from absolute hrefs.
    pub origin: String,
    pub summary_max_chars: usize,
    /// Labels that open the trailing metadata block of an entry description.
    pub metadata_labels: Vec<String>,
    /// Entry titles the view layer never shows.
    pub hidden_titles: Vec<String>,
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_owned(),
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
            metadata_labels: DEFAULT_METADATA_LABELS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            hidden_titles: DEFAULT_HIDDEN_TITLES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("OPDSNAV_ORIGIN") {
            config.origin = parse_origin(&raw)
                .with_context(|| format!("invalid OPDSNAV_ORIGIN={raw:?}"))?;
        }
        if let Ok(raw) = std::env::var("OPDSNAV_SUMMARY_MAX_CHARS") {
            config.summary_max_chars = parse_positive(&raw)
                .with_context(|| format!("invalid OPDSNAV_SUMMARY_MAX_CHARS={raw:?}"))?;
        }
        if let Ok(raw) = std::env::var("OPDSNAV_METADATA_LABELS") {
            config.metadata_labels = parse_list(&raw);
        }
        if let Ok(raw) = std::env::var("OPDSNAV_HIDDEN_TITLES") {
            config.hidden_titles = parse_list(&raw);
        }
        if let Ok(raw) = std::env::var("OPDSNAV_FETCH_TIMEOUT_SECS") {
            let secs = parse_positive(&raw)
                .with_context(|| format!("invalid OPDSNAV_FETCH_TIMEOUT_SECS={raw:?}"))?;
            config.fetch_timeout = Duration::from_secs(secs as u64);
        }

        Ok(config)
    }
}

pub fn parse_origin(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = url::Url::parse(trimmed).context("parse origin url")?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("origin must be http/https: {url}");
    }
    if url.host_str().is_none() {
        anyhow::bail!("origin must have host: {url}");
    }
    Ok(trimmed.to_owned())
}

pub fn parse_positive(raw: &str) -> anyhow::Result<usize> {
    let value = raw.trim().parse::<usize>().context("parse number")?;
    if value == 0 {
        anyhow::bail!("value must be positive");
    }
    Ok(value)
}

/// Comma-separated list; blank items dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
