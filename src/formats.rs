use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Path (plus optional query) of a resource behind the local proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogLocation(String);

impl CatalogLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn root() -> Self {
        Self(crate::config::ROOT_LOCATION.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == crate::config::ROOT_LOCATION
    }

    /// Path component without the query string.
    pub fn path(&self) -> &str {
        match self.0.split_once('?') {
            Some((path, _)) => path,
            None => &self.0,
        }
    }
}

impl fmt::Display for CatalogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for CatalogLocation {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for CatalogLocation {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedLink {
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
}

impl FeedLink {
    pub fn kind(&self) -> LinkKind {
        let Some(mime_type) = self.mime_type.as_deref() else {
            return LinkKind::Other;
        };
        if mime_type.starts_with("application/atom+xml") {
            return LinkKind::Catalog;
        }
        match BookFormat::classify(mime_type) {
            Some(format) => LinkKind::Book(format),
            None => LinkKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Catalog,
    Book(BookFormat),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookFormat {
    Epub,
    Fb2,
    Mobi,
}

impl BookFormat {
    pub fn classify(mime_type: &str) -> Option<Self> {
        if mime_type.contains("epub") {
            Some(Self::Epub)
        } else if mime_type.contains("fb2") {
            Some(Self::Fb2)
        } else if mime_type.contains("mobi") {
            Some(Self::Mobi)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Epub => "EPUB",
            Self::Fb2 => "FB2",
            Self::Mobi => "MOBI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    pub display_content: String,
    pub authors: Vec<String>,
    pub links: Vec<FeedLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub title: String,
    pub entries: Vec<CatalogEntry>,
    /// Feed-level links keyed by `rel`, hrefs already normalized.
    pub relation_links: BTreeMap<String, String>,
}

impl Feed {
    pub fn next_href(&self) -> Option<&str> {
        self.relation_links
            .get(crate::config::NEXT_REL)
            .map(String::as_str)
            .filter(|href| !href.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub next_href: Option<String>,
    pub is_loading_more: bool,
}
