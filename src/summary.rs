use regex::{Regex, RegexBuilder};
use scraper::{Html, Node};

use crate::config::{DEFAULT_METADATA_LABELS, DEFAULT_SUMMARY_MAX_CHARS};

const ELLIPSIS: char = '…';

#[derive(Debug, Clone)]
pub struct Summarizer {
    marker: Option<Regex>,
    max_chars: usize,
}

impl Default for Summarizer {
    fn default() -> Self {
        let labels = DEFAULT_METADATA_LABELS
            .iter()
            .map(|s| (*s).to_owned())
            .collect::<Vec<_>>();
        Self {
            marker: build_marker(&labels),
            max_chars: DEFAULT_SUMMARY_MAX_CHARS,
        }
    }
}

impl Summarizer {
    pub fn new(labels: &[String], max_chars: usize) -> Self {
        Self {
            marker: build_marker(labels),
            max_chars,
        }
    }

    pub fn summarize(&self, html: Option<&str>) -> String {
        self.summarize_with_limit(html, self.max_chars)
    }

    pub fn summarize_with_limit(&self, html: Option<&str>, max_chars: usize) -> String {
        let Some(html) = html else {
            return String::new();
        };

        let (main, meta) = self.split_meta(html);
        let text = strip_markup(main);
        let mut out = truncate_chars(text.trim(), max_chars);
        if let Some(meta) = meta {
            out.push('\n');
            out.push_str(meta);
        }
        out
    }

    /// Splits at the first metadata marker; the meta half keeps the marker itself.
    pub fn split_meta<'a>(&self, html: &'a str) -> (&'a str, Option<&'a str>) {
        let found = self.marker.as_ref().and_then(|marker| marker.find(html));
        match found {
            Some(m) => (&html[..m.start()], Some(&html[m.start()..])),
            None => (html, None),
        }
    }
}

fn build_marker(labels: &[String]) -> Option<Regex> {
    let alternatives = labels
        .iter()
        .map(|label| label.trim())
        .filter(|label| !label.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>();
    if alternatives.is_empty() {
        return None;
    }

    let pattern = format!(r"(?:<br\s*/?>|\n)\s*(?:{})\s*:", alternatives.join("|"));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(err) => {
            tracing::warn!(?err, "metadata marker pattern rejected; descriptions will not be split");
            None
        }
    }
}

fn strip_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    for node in fragment.tree.root().descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out = text
        .chars()
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_owned();
    out.push(ELLIPSIS);
    out
}

/// Summarizes with the default labels.
pub fn summarize(html: Option<&str>, max_chars: usize) -> String {
    Summarizer::default().summarize_with_limit(html, max_chars)
}
