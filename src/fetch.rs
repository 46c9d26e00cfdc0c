use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use url::Url;

use crate::formats::CatalogLocation;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("GET {location}: upstream returned {status}")]
    Status { location: String, status: u16 },
    #[error("GET {location}: {message}")]
    Transport { location: String, message: String },
    #[error("GET {location}: cancelled by a newer navigation")]
    Cancelled { location: String },
    #[error("invalid proxy url for {location}: {message}")]
    InvalidUrl { location: String, message: String },
}

/// Retrieves feed documents from the proxy.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, location: &CatalogLocation) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpFeedFetcher {
    pub fn new(base_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            anyhow::bail!("proxy url must be http/https: {base_url}");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build feed http client")?;
        Ok(Self { client, base_url })
    }

    pub fn url_for(&self, location: &CatalogLocation) -> Result<Url, FetchError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{location}")).map_err(|err| FetchError::InvalidUrl {
            location: location.to_string(),
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, location: &CatalogLocation) -> Result<String, FetchError> {
        let url = self.url_for(location)?;
        let transport = |err: reqwest::Error| FetchError::Transport {
            location: location.to_string(),
            message: err.to_string(),
        };

        tracing::debug!(%url, "fetching feed");
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, "opdsnav/0.1")
            .header(
                ACCEPT,
                "application/atom+xml,application/xml;q=0.9,text/xml;q=0.8,*/*;q=0.5",
            )
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                location: location.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(transport)
    }
}
