use serde::Serialize;

use crate::download::DownloadAction;
use crate::formats::{BookFormat, CatalogEntry, CatalogLocation, Feed, LinkKind};
use crate::link::LinkNormalizer;
use crate::navigation::Breadcrumb;
use crate::session::NavigatorSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatLink {
    pub format: BookFormat,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryCard {
    pub title: String,
    pub authors: Vec<String>,
    pub content: String,
    /// Sub-catalog opened by the card, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<CatalogLocation>,
    pub formats: Vec<FormatLink>,
}

pub fn entry_card(entry: &CatalogEntry, normalizer: &LinkNormalizer) -> EntryCard {
    let open = entry
        .links
        .iter()
        .find(|link| link.kind() == LinkKind::Catalog)
        .map(|link| normalizer.normalize(&link.href))
        .filter(|href| !href.is_empty())
        .map(CatalogLocation::new);

    let formats = entry
        .links
        .iter()
        .filter_map(|link| match link.kind() {
            LinkKind::Book(format) => Some(FormatLink {
                format,
                href: normalizer.normalize(&link.href),
            }),
            _ => None,
        })
        .collect();

    EntryCard {
        title: entry.title.clone(),
        authors: entry.authors.clone(),
        content: entry.display_content.clone(),
        open,
        formats,
    }
}

/// Entries whose title is not hidden, in feed order.
pub fn visible_entries<'a>(
    feed: &'a Feed,
    hidden_titles: &'a [String],
) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
    feed.entries
        .iter()
        .filter(move |entry| !hidden_titles.iter().any(|hidden| *hidden == entry.title))
}

pub fn visible_cards(
    feed: &Feed,
    hidden_titles: &[String],
    normalizer: &LinkNormalizer,
) -> Vec<EntryCard> {
    visible_entries(feed, hidden_titles)
        .map(|entry| entry_card(entry, normalizer))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub location: CatalogLocation,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub title: String,
    pub entries: Vec<EntryCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
    pub search_enabled: bool,
}

impl PageView {
    pub fn from_session(session: &NavigatorSession) -> Self {
        let config = session.config();
        Self {
            location: session.current().clone(),
            breadcrumbs: session.history().breadcrumbs(),
            title: session.feed().title.clone(),
            entries: visible_cards(
                session.feed(),
                &config.hidden_titles,
                session.parser().normalizer(),
            ),
            next: session.pagination().next_href.clone(),
            download: session.download_target(),
            search_enabled: session.current().is_root(),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let trail = self
            .breadcrumbs
            .iter()
            .map(|crumb| crumb.label.as_str())
            .collect::<Vec<_>>()
            .join(" > ");
        out.push_str(&format!("{trail}\n"));

        if let Some(target) = &self.download {
            out.push_str(&format!("\nDownload: {target}\n"));
            return out;
        }

        if !self.title.is_empty() {
            out.push_str(&format!("\n# {}\n", self.title));
        }
        for card in &self.entries {
            out.push_str(&format!("\n## {}\n", card.title));
            if !card.authors.is_empty() {
                out.push_str(&format!("Автор: {}\n", card.authors.join(", ")));
            }
            if !card.content.is_empty() {
                out.push_str(&card.content);
                out.push('\n');
            }
            if let Some(open) = &card.open {
                out.push_str(&format!("-> {open}\n"));
            }
            for link in &card.formats {
                out.push_str(&format!("[{}] {}\n", link.format.label(), link.href));
            }
        }
        if let Some(next) = &self.next {
            out.push_str(&format!("\n(more: {next})\n"));
        }
        out
    }
}

/// Text for a routed format link.
pub fn describe_action(action: &DownloadAction) -> String {
    match action {
        DownloadAction::Direct(href) => format!("open {href}"),
        DownloadAction::Intercept(location) => format!("show download view {location}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::FeedLink;

    fn link(href: &str, mime_type: &str) -> FeedLink {
        FeedLink {
            href: href.to_owned(),
            mime_type: Some(mime_type.to_owned()),
            rel: None,
        }
    }

    fn entry(title: &str, links: Vec<FeedLink>) -> CatalogEntry {
        CatalogEntry {
            title: title.to_owned(),
            raw_content: None,
            display_content: String::new(),
            authors: Vec::new(),
            links,
        }
    }

    #[test]
    fn card_uses_first_catalog_link_and_all_formats() {
        let e = entry(
            "Книга",
            vec![
                link("/b/1/fb2", "application/fb2+zip"),
                link("/genre/5", "application/atom+xml;profile=opds-catalog"),
                link("http://flibusta.is/opds/other", "application/atom+xml"),
                link("http://flibusta.is/b/1/epub", "application/epub+zip"),
                link("/i/1/cover.jpg", "image/jpeg"),
                link("/b/1/mobi", "application/x-mobipocket-ebook"),
            ],
        );
        let card = entry_card(&e, &LinkNormalizer::default());
        assert_eq!(card.open, Some(CatalogLocation::new("/opds/genre/5")));
        let formats = card
            .formats
            .iter()
            .map(|f| (f.format.label(), f.href.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            formats,
            vec![
                ("FB2", "/b/1/fb2"),
                ("EPUB", "/b/1/epub"),
                ("MOBI", "/b/1/mobi")
            ]
        );
    }

    #[test]
    fn my_shelf_entry_is_hidden() {
        let feed = Feed {
            title: "Root".to_owned(),
            entries: vec![
                entry("Новинки", Vec::new()),
                entry("Моя полка", Vec::new()),
                entry("Жанры", Vec::new()),
            ],
            ..Feed::default()
        };
        let hidden = vec!["Моя полка".to_owned()];
        let cards = visible_cards(&feed, &hidden, &LinkNormalizer::default());
        let titles = cards.iter().map(|c| c.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Новинки", "Жанры"]);
        // The parsed feed itself keeps the entry.
        assert_eq!(feed.entries.len(), 3);
    }

    #[test]
    fn render_text_lists_cards_and_download_view() {
        let root = CatalogLocation::root();
        let mut page = PageView {
            location: root.clone(),
            breadcrumbs: vec![Breadcrumb {
                index: 0,
                label: "Главная".to_owned(),
                location: root,
            }],
            title: "Flibusta".to_owned(),
            entries: vec![EntryCard {
                title: "Солярис".to_owned(),
                authors: vec!["Станислав Лем".to_owned()],
                content: "Океан".to_owned(),
                open: None,
                formats: vec![FormatLink {
                    format: BookFormat::Epub,
                    href: "/b/1/epub".to_owned(),
                }],
            }],
            next: Some("/opds/p/2".to_owned()),
            download: None,
            search_enabled: true,
        };
        assert_eq!(
            page.render_text(),
            "Главная\n\n# Flibusta\n\n## Солярис\nАвтор: Станислав Лем\nОкеан\n[EPUB] /b/1/epub\n\n(more: /opds/p/2)\n"
        );

        page.download = Some("/b/1/epub".to_owned());
        assert_eq!(page.render_text(), "Главная\n\nDownload: /b/1/epub\n");
    }

    #[test]
    fn card_without_links_has_nothing_to_open() {
        let card = entry_card(&entry("x", Vec::new()), &LinkNormalizer::default());
        assert_eq!(card.open, None);
        assert!(card.formats.is_empty());
    }
}
