use crate::config::DEFAULT_ORIGIN;

const PROXY_PREFIXES: &[&str] = &["/opds", "/b"];
const CATALOG_PREFIX: &str = "/opds";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkNormalizer {
    origin: String,
}

impl Default for LinkNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN)
    }
}

impl LinkNormalizer {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    /// Returns an empty string for an empty href; callers treat that as "no link".
    pub fn normalize(&self, href: &str) -> String {
        if href.is_empty() {
            return String::new();
        }
        if is_proxy_rooted(href) {
            return href.to_owned();
        }
        if !self.origin.is_empty() {
            if let Some(rest) = href.strip_prefix(self.origin.as_str()) {
                return root_relative(rest);
            }
        }
        format!("{CATALOG_PREFIX}{href}")
    }
}

fn is_proxy_rooted(href: &str) -> bool {
    PROXY_PREFIXES.iter().any(|prefix| href.starts_with(prefix))
}

// Origin-stripped remainder: proxy paths stay as-is, anything else lands under the catalog.
fn root_relative(rest: &str) -> String {
    if rest.is_empty() || is_proxy_rooted(rest) {
        rest.to_owned()
    } else {
        format!("{CATALOG_PREFIX}{rest}")
    }
}

/// Normalizes with the default origin.
pub fn normalize(href: &str) -> String {
    LinkNormalizer::default().normalize(href)
}
