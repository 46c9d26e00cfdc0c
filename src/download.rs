use url::form_urlencoded;

use crate::formats::CatalogLocation;

pub const DOWNLOAD_PATH: &str = "/download";

pub trait PlatformProbe: Send + Sync {
    fn is_ios_family(&self) -> bool;
    fn is_standalone(&self) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct UserAgentPlatform {
    user_agent: String,
    standalone: bool,
}

impl UserAgentPlatform {
    pub fn new(user_agent: impl Into<String>, standalone: bool) -> Self {
        Self {
            user_agent: user_agent.into(),
            standalone,
        }
    }
}

impl PlatformProbe for UserAgentPlatform {
    fn is_ios_family(&self) -> bool {
        ["iPhone", "iPad", "iPod"]
            .iter()
            .any(|device| self.user_agent.contains(device))
    }

    fn is_standalone(&self) -> bool {
        self.standalone
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadAction {
    Direct(String),
    /// Push this location; it renders the download view.
    Intercept(CatalogLocation),
}

pub struct DownloadRouter {
    platform: Box<dyn PlatformProbe>,
}

impl std::fmt::Debug for DownloadRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRouter")
            .field("should_intercept", &self.should_intercept())
            .finish()
    }
}

impl Default for DownloadRouter {
    fn default() -> Self {
        Self::new(UserAgentPlatform::default())
    }
}

impl DownloadRouter {
    pub fn new(platform: impl PlatformProbe + 'static) -> Self {
        Self {
            platform: Box::new(platform),
        }
    }

    pub fn should_intercept(&self) -> bool {
        self.platform.is_ios_family() && self.platform.is_standalone()
    }

    /// `href` must already be normalized.
    pub fn route(&self, href: &str) -> DownloadAction {
        if self.should_intercept() {
            DownloadAction::Intercept(download_location(href))
        } else {
            DownloadAction::Direct(href.to_owned())
        }
    }
}

pub fn download_location(href: &str) -> CatalogLocation {
    let encoded = form_urlencoded::byte_serialize(href.as_bytes()).collect::<String>();
    CatalogLocation::new(format!("{DOWNLOAD_PATH}?url={encoded}"))
}

/// Target href of a download-view location, if `location` is one.
pub fn download_target(location: &CatalogLocation) -> Option<String> {
    let (path, query) = location.as_str().split_once('?')?;
    if path != DOWNLOAD_PATH {
        return None;
    }
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

pub fn is_download_location(location: &CatalogLocation) -> bool {
    location.path() == DOWNLOAD_PATH
}
