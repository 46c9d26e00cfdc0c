use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};

use crate::config::EngineConfig;
use crate::formats::{CatalogEntry, Feed, FeedLink};
use crate::link::LinkNormalizer;
use crate::summary::Summarizer;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed xml at byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("document has no root element")]
    NoRoot,
    #[error("element <{0}> is not closed")]
    Unclosed(String),
    #[error("content outside of the root element")]
    OutsideRoot,
}

#[derive(Debug, Clone, Default)]
pub struct FeedParser {
    normalizer: LinkNormalizer,
    summarizer: Summarizer,
}

impl FeedParser {
    pub fn new(normalizer: LinkNormalizer, summarizer: Summarizer) -> Self {
        Self {
            normalizer,
            summarizer,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            LinkNormalizer::new(config.origin.clone()),
            Summarizer::new(&config.metadata_labels, config.summary_max_chars),
        )
    }

    pub fn normalizer(&self) -> &LinkNormalizer {
        &self.normalizer
    }

    pub fn parse(&self, document: &str) -> Result<Feed, ParseError> {
        let mut reader = Reader::from_str(document);
        reader.config_mut().trim_text(false);
        let decoder = reader.decoder();

        let mut builder = FeedBuilder::new(self);
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|err| ParseError::Xml {
                    position: reader.error_position(),
                    message: err.to_string(),
                })?;
            let position = reader.buffer_position();
            let at = |message: String| ParseError::Xml { position, message };

            match event {
                Event::Start(e) => builder.open(&e, decoder, false).map_err(at)?,
                Event::Empty(e) => builder.open(&e, decoder, true).map_err(at)?,
                Event::End(_) => builder.close(),
                Event::Text(e) => {
                    let text = e.decode().map_err(|err| at(err.to_string()))?;
                    builder.text(&text)?;
                }
                Event::CData(e) => {
                    let text = decoder.decode(&e).map_err(|err| at(err.to_string()))?;
                    builder.text(&text)?;
                }
                Event::GeneralRef(e) => {
                    let name = e.decode().map_err(|err| at(err.to_string()))?;
                    let entity = format!("&{name};");
                    let resolved =
                        quick_xml::escape::unescape(&entity).map_err(|err| at(err.to_string()))?;
                    builder.text(&resolved)?;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        builder.finish()
    }
}

/// Parses with the default origin and summarizer settings.
pub fn parse_feed(document: &str) -> Result<Feed, ParseError> {
    FeedParser::default().parse(document)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    FeedTitle,
    EntryTitle,
    EntryContent,
    AuthorName,
}

#[derive(Debug)]
struct Capture {
    target: TextTarget,
    depth: usize,
    text: String,
}

#[derive(Debug, Default)]
struct EntryBuilder {
    depth: usize,
    title: Option<String>,
    content: Option<String>,
    authors: Vec<String>,
    links: Vec<FeedLink>,
}

struct FeedBuilder<'p> {
    parser: &'p FeedParser,
    stack: Vec<String>,
    saw_root: bool,
    title: Option<String>,
    entries: Vec<CatalogEntry>,
    relation_links: BTreeMap<String, String>,
    entry: Option<EntryBuilder>,
    capture: Option<Capture>,
}

impl<'p> FeedBuilder<'p> {
    fn new(parser: &'p FeedParser) -> Self {
        Self {
            parser,
            stack: Vec::new(),
            saw_root: false,
            title: None,
            entries: Vec::new(),
            relation_links: BTreeMap::new(),
            entry: None,
            capture: None,
        }
    }

    fn open(&mut self, e: &BytesStart<'_>, decoder: Decoder, empty: bool) -> Result<(), String> {
        if self.stack.is_empty() {
            if self.saw_root {
                return Err("second root element".to_owned());
            }
            self.saw_root = true;
        }

        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let parent = self.stack.last().map(String::as_str);
        let depth = self.stack.len() + 1;

        if name == "entry" && self.entry.is_none() {
            self.entry = Some(EntryBuilder {
                depth,
                ..EntryBuilder::default()
            });
            if empty {
                self.finish_entry();
            }
            return self.push(name, empty);
        }

        if name == "link" {
            let link = read_link(e, decoder)?;
            if let Some(entry) = self.entry.as_mut() {
                entry.links.push(link);
            } else if parent == Some("feed") {
                if let Some(rel) = link.rel {
                    let href = self.parser.normalizer.normalize(&link.href);
                    self.relation_links.entry(rel).or_insert(href);
                }
            }
            return self.push(name, empty);
        }

        if self.capture.is_none() {
            if let Some(target) = self.text_target(&name, parent) {
                self.capture = Some(Capture {
                    target,
                    depth,
                    text: String::new(),
                });
                if empty {
                    self.finish_capture();
                }
            }
        }

        self.push(name, empty)
    }

    fn push(&mut self, name: String, empty: bool) -> Result<(), String> {
        if !empty {
            self.stack.push(name);
        }
        Ok(())
    }

    fn text_target(&self, name: &str, parent: Option<&str>) -> Option<TextTarget> {
        match (&self.entry, name) {
            (Some(entry), "title") if entry.title.is_none() => Some(TextTarget::EntryTitle),
            (Some(entry), "content") if entry.content.is_none() => Some(TextTarget::EntryContent),
            (Some(_), "name") if parent == Some("author") => Some(TextTarget::AuthorName),
            (None, "title") if parent == Some("feed") && self.title.is_none() => {
                Some(TextTarget::FeedTitle)
            }
            _ => None,
        }
    }

    fn close(&mut self) {
        self.stack.pop();
        let depth = self.stack.len();

        if self.capture.as_ref().is_some_and(|c| depth < c.depth) {
            self.finish_capture();
        }
        if self.entry.as_ref().is_some_and(|e| depth < e.depth) {
            self.finish_entry();
        }
    }

    fn text(&mut self, text: &str) -> Result<(), ParseError> {
        if self.stack.is_empty() {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(ParseError::OutsideRoot);
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
        Ok(())
    }

    fn finish_capture(&mut self) {
        let Some(capture) = self.capture.take() else {
            return;
        };
        match capture.target {
            TextTarget::FeedTitle => self.title = Some(capture.text.trim().to_owned()),
            TextTarget::EntryTitle => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.title = Some(capture.text.trim().to_owned());
                }
            }
            TextTarget::EntryContent => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.content = Some(capture.text);
                }
            }
            TextTarget::AuthorName => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.authors.push(capture.text.trim().to_owned());
                }
            }
        }
    }

    fn finish_entry(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let display_content = self.parser.summarizer.summarize(entry.content.as_deref());
        self.entries.push(CatalogEntry {
            title: entry.title.unwrap_or_default(),
            raw_content: entry.content,
            display_content,
            authors: entry.authors,
            links: entry.links,
        });
    }

    fn finish(self) -> Result<Feed, ParseError> {
        if let Some(open) = self.stack.last() {
            return Err(ParseError::Unclosed(open.clone()));
        }
        if !self.saw_root {
            return Err(ParseError::NoRoot);
        }

        Ok(Feed {
            title: self.title.unwrap_or_default(),
            entries: self.entries,
            relation_links: self.relation_links,
        })
    }
}

fn read_link(e: &BytesStart<'_>, decoder: Decoder) -> Result<FeedLink, String> {
    let mut href = None;
    let mut mime_type = None;
    let mut rel = None;

    for attr in e.attributes() {
        let attr = attr.map_err(|err| format!("attribute error: {err}"))?;
        let raw = decoder
            .decode(&attr.value)
            .map_err(|err| format!("decode attribute: {err}"))?;
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|err| format!("unescape attribute: {err}"))?
            .into_owned();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"type" => mime_type = Some(value),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }

    Ok(FeedLink {
        href: href.unwrap_or_default(),
        mime_type,
        rel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opds="http://opds-spec.org/2010/catalog">
  <id>tag:root</id>
  <title>Новинки</title>
  <link href="/opds/new/1/new" rel="next" type="application/atom+xml;profile=opds-catalog" />
  <link href="http://flibusta.is/opds" rel="start" type="application/atom+xml" />
  <link href="/opds/opensearch" rel="search" type="application/opensearchdescription+xml" />
  <entry>
    <title>Солярис</title>
    <author><name>Станислав Лем</name><uri>/a/1</uri></author>
    <content type="text/html">&lt;p&gt;Океан &amp;amp; станция.&lt;/p&gt;&lt;br/&gt;Год издания: 1961</content>
    <link href="/b/100/epub" rel="http://opds-spec.org/acquisition/open-access" type="application/epub+zip" />
    <link href="/b/100/fb2" rel="http://opds-spec.org/acquisition/open-access" type="application/fb2+zip" />
    <link href="/a/1" rel="related" type="application/atom+xml" />
  </entry>
  <entry>
    <title>Пикник на обочине</title>
    <author><name>Аркадий Стругацкий</name></author>
    <author><name>Борис Стругацкий</name></author>
    <link href="/b/200/mobi" type="application/x-mobipocket-ebook" />
  </entry>
</feed>
"#;

    #[test]
    fn parses_title_entries_and_relations() {
        let feed = parse_feed(SAMPLE).unwrap();
        assert_eq!(feed.title, "Новинки");
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.next_href(), Some("/opds/new/1/new"));
        assert_eq!(feed.relation_links.get("start").unwrap(), "/opds");
        assert_eq!(
            feed.relation_links.get("search").unwrap(),
            "/opds/opensearch"
        );
    }

    #[test]
    fn entries_keep_document_order_and_fields() {
        let feed = parse_feed(SAMPLE).unwrap();
        let first = &feed.entries[0];
        assert_eq!(first.title, "Солярис");
        assert_eq!(first.authors, vec!["Станислав Лем"]);
        assert_eq!(
            first.raw_content.as_deref(),
            Some("<p>Океан &amp; станция.</p><br/>Год издания: 1961")
        );
        assert_eq!(
            first.display_content,
            "Океан & станция.\n<br/>Год издания: 1961"
        );
        assert_eq!(first.links.len(), 3);
        assert_eq!(first.links[0].href, "/b/100/epub");
        assert_eq!(
            first.links[0].mime_type.as_deref(),
            Some("application/epub+zip")
        );

        let second = &feed.entries[1];
        assert_eq!(second.title, "Пикник на обочине");
        assert_eq!(
            second.authors,
            vec!["Аркадий Стругацкий", "Борис Стругацкий"]
        );
        assert_eq!(second.raw_content, None);
        assert_eq!(second.display_content, "");
        assert_eq!(second.links[0].rel, None);
    }

    #[test]
    fn entry_links_are_not_normalized_at_parse_time() {
        let doc = r#"<feed><entry><title>x</title>
            <link href="http://flibusta.is/opds/author/1" type="application/atom+xml"/>
            </entry></feed>"#;
        let feed = parse_feed(doc).unwrap();
        assert_eq!(
            feed.entries[0].links[0].href,
            "http://flibusta.is/opds/author/1"
        );
    }

    #[test]
    fn empty_feed_has_no_entries() {
        let feed = parse_feed(r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>Пусто</title></feed>"#)
            .unwrap();
        assert_eq!(feed.title, "Пусто");
        assert!(feed.entries.is_empty());
        assert!(feed.relation_links.is_empty());
        assert_eq!(feed.next_href(), None);
    }

    #[test]
    fn missing_elements_degrade() {
        let feed = parse_feed("<feed><entry><content>text</content></entry><entry/></feed>").unwrap();
        assert_eq!(feed.title, "");
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].title, "");
        assert!(feed.entries[0].authors.is_empty());
        assert_eq!(feed.entries[0].display_content, "text");
        assert!(feed.entries[1].links.is_empty());
    }

    #[test]
    fn prefixed_elements_and_cdata() {
        let doc = r#"<atom:feed xmlns:atom="http://www.w3.org/2005/Atom">
            <atom:title>Prefixed</atom:title>
            <atom:entry><atom:title>E</atom:title>
              <atom:content><![CDATA[<b>bold</b> text]]></atom:content>
            </atom:entry></atom:feed>"#;
        let feed = parse_feed(doc).unwrap();
        assert_eq!(feed.title, "Prefixed");
        assert_eq!(feed.entries[0].display_content, "bold text");
    }

    #[test]
    fn entry_title_does_not_override_feed_title() {
        let doc = "<feed><entry><title>Entry</title></entry><title>Late</title></feed>";
        let feed = parse_feed(doc).unwrap();
        assert_eq!(feed.title, "Late");
        assert_eq!(feed.entries[0].title, "Entry");
    }

    #[test]
    fn author_name_outside_author_is_ignored() {
        let doc = "<feed><entry><name>stray</name><author><name>A</name></author></entry></feed>";
        let feed = parse_feed(doc).unwrap();
        assert_eq!(feed.entries[0].authors, vec!["A"]);
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(parse_feed("").is_err());
        assert!(parse_feed("not xml at all").is_err());
        assert!(parse_feed("<feed><entry></feed>").is_err());
        assert!(parse_feed("<feed><title>x</title>").is_err());
        assert!(parse_feed("<feed/><feed/>").is_err());
        assert!(parse_feed("<feed>&undefined;</feed>").is_err());
    }

    #[test]
    fn custom_origin_is_stripped_from_relations() {
        let parser = FeedParser::new(
            LinkNormalizer::new("https://books.example"),
            Summarizer::default(),
        );
        let doc = r#"<feed><link rel="next" href="https://books.example/opds/p/2"/></feed>"#;
        let feed = parser.parse(doc).unwrap();
        assert_eq!(feed.next_href(), Some("/opds/p/2"));
    }
}
