use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

use crate::config::EngineConfig;
use crate::download::{self, DownloadAction, DownloadRouter};
use crate::feed::FeedParser;
use crate::fetch::{FeedFetcher, FetchError};
use crate::formats::{CatalogLocation, Feed, FeedLink, PaginationState};
use crate::navigation::{NavigationError, NavigationHistory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadKind {
    Replace,
    Append,
}

#[derive(Debug, Clone)]
pub struct LoadTicket {
    location: CatalogLocation,
    generation: u64,
    kind: LoadKind,
    cancel: CancellationToken,
}

impl LoadTicket {
    pub fn location(&self) -> &CatalogLocation {
        &self.location
    }

    pub fn kind(&self) -> LoadKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetches the ticket's location, giving up as soon as the ticket is cancelled.
    pub async fn fetch(&self, fetcher: &dyn FeedFetcher) -> Result<String, FetchError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled {
                location: self.location.to_string(),
            }),
            result = fetcher.fetch(&self.location) => result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { entries: usize },
    /// The result belonged to a navigation the session has moved past.
    Discarded,
    /// Nothing to load (no next page, a load already running, or a download view).
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("load {location}")]
    Fetch {
        location: CatalogLocation,
        #[source]
        source: FetchError,
    },
    #[error("load next page of {location}")]
    Pagination {
        location: CatalogLocation,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

pub struct NavigatorSession {
    config: EngineConfig,
    parser: FeedParser,
    fetcher: Arc<dyn FeedFetcher>,
    router: DownloadRouter,
    history: NavigationHistory,
    feed: Feed,
    pagination: PaginationState,
    generation: u64,
    in_flight: CancellationToken,
}

impl std::fmt::Debug for NavigatorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigatorSession")
            .field("history", &self.history)
            .field("feed_title", &self.feed.title)
            .field("entries", &self.feed.entries.len())
            .field("pagination", &self.pagination)
            .field("generation", &self.generation)
            .finish()
    }
}

impl NavigatorSession {
    pub fn new(config: EngineConfig, fetcher: Arc<dyn FeedFetcher>, router: DownloadRouter) -> Self {
        Self {
            parser: FeedParser::from_config(&config),
            config,
            fetcher,
            router,
            history: NavigationHistory::default(),
            feed: Feed::default(),
            pagination: PaginationState::default(),
            generation: 0,
            in_flight: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn parser(&self) -> &FeedParser {
        &self.parser
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    pub fn current(&self) -> &CatalogLocation {
        self.history.current()
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn pagination(&self) -> &PaginationState {
        &self.pagination
    }

    pub fn download_target(&self) -> Option<String> {
        download::download_target(self.current())
    }

    pub fn push(&mut self, location: CatalogLocation) -> Option<LoadTicket> {
        tracing::debug!(%location, "push location");
        self.history.push(location);
        self.begin_replace()
    }

    pub fn jump_to(&mut self, index: usize) -> Result<Option<LoadTicket>, NavigationError> {
        self.history.jump_to(index)?;
        tracing::debug!(index, location = %self.current(), "jump to breadcrumb");
        Ok(self.begin_replace())
    }

    pub fn back(&mut self) -> Option<LoadTicket> {
        if !self.history.back() {
            tracing::debug!("already at root; back ignored");
            return None;
        }
        self.begin_replace()
    }

    pub fn search(&mut self, query: &str) -> Option<LoadTicket> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        self.push(search_location(query))
    }

    pub fn reload(&mut self) -> Option<LoadTicket> {
        self.begin_replace()
    }

    pub fn open_catalog_link(&mut self, link: &FeedLink) -> Option<LoadTicket> {
        let href = self.parser.normalizer().normalize(&link.href);
        if href.is_empty() {
            return None;
        }
        self.push(CatalogLocation::new(href))
    }

    /// Routes a format link; on interception the download view location is pushed.
    pub fn activate_format(&mut self, link: &FeedLink) -> DownloadAction {
        let href = self.parser.normalizer().normalize(&link.href);
        let action = self.router.route(&href);
        if let DownloadAction::Intercept(location) = &action {
            self.push(location.clone());
        }
        action
    }

    pub fn begin_load_more(&mut self) -> Option<LoadTicket> {
        if self.pagination.is_loading_more {
            tracing::debug!("load more already in progress; ignored");
            return None;
        }
        let Some(next) = self.pagination.next_href.clone() else {
            tracing::debug!("no next page; load more ignored");
            return None;
        };

        self.pagination.is_loading_more = true;
        Some(LoadTicket {
            location: CatalogLocation::new(next),
            generation: self.generation,
            kind: LoadKind::Append,
            cancel: self.in_flight.child_token(),
        })
    }

    fn begin_replace(&mut self) -> Option<LoadTicket> {
        self.in_flight.cancel();
        self.in_flight = CancellationToken::new();
        self.generation += 1;
        self.pagination = PaginationState::default();

        let location = self.current().clone();
        if download::is_download_location(&location) {
            return None;
        }

        Some(LoadTicket {
            location,
            generation: self.generation,
            kind: LoadKind::Replace,
            cancel: self.in_flight.clone(),
        })
    }

    pub fn commit(
        &mut self,
        ticket: LoadTicket,
        result: Result<String, FetchError>,
    ) -> Result<LoadOutcome, SessionError> {
        if !self.is_live(&ticket) {
            tracing::debug!(
                location = %ticket.location,
                kind = ?ticket.kind,
                "discarding stale load result"
            );
            return Ok(LoadOutcome::Discarded);
        }

        match ticket.kind {
            LoadKind::Replace => self.commit_replace(ticket, result),
            LoadKind::Append => self.commit_append(ticket, result),
        }
    }

    fn is_live(&self, ticket: &LoadTicket) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        match ticket.kind {
            LoadKind::Replace => ticket.location == *self.current(),
            LoadKind::Append => self.pagination.is_loading_more,
        }
    }

    fn commit_replace(
        &mut self,
        ticket: LoadTicket,
        result: Result<String, FetchError>,
    ) -> Result<LoadOutcome, SessionError> {
        let document = match result {
            Ok(document) => document,
            Err(source) => {
                tracing::warn!(location = %ticket.location, err = %source, "feed load failed");
                return Err(SessionError::Fetch {
                    location: ticket.location,
                    source,
                });
            }
        };

        let feed = self.parse_or_empty(&ticket.location, &document);
        self.pagination = PaginationState {
            next_href: feed.next_href().map(str::to_owned),
            is_loading_more: false,
        };
        self.feed = feed;

        tracing::info!(
            location = %ticket.location,
            entries = self.feed.entries.len(),
            has_next = self.pagination.next_href.is_some(),
            "feed loaded"
        );
        Ok(LoadOutcome::Applied {
            entries: self.feed.entries.len(),
        })
    }

    fn commit_append(
        &mut self,
        ticket: LoadTicket,
        result: Result<String, FetchError>,
    ) -> Result<LoadOutcome, SessionError> {
        self.pagination.is_loading_more = false;

        let document = match result {
            Ok(document) => document,
            Err(source) => {
                tracing::warn!(location = %ticket.location, err = %source, "next page load failed");
                return Err(SessionError::Pagination {
                    location: self.current().clone(),
                    source,
                });
            }
        };

        let page = self.parse_or_empty(&ticket.location, &document);
        let added = page.entries.len();
        self.pagination.next_href = page.next_href().map(str::to_owned);
        self.feed.entries.extend(page.entries);

        tracing::info!(
            location = %ticket.location,
            added,
            total = self.feed.entries.len(),
            has_next = self.pagination.next_href.is_some(),
            "next page appended"
        );
        Ok(LoadOutcome::Applied { entries: added })
    }

    fn parse_or_empty(&self, location: &CatalogLocation, document: &str) -> Feed {
        match self.parser.parse(document) {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!(%location, %err, "unparseable feed; showing empty catalog");
                Feed::default()
            }
        }
    }

    /// An abandoned page load can be retried.
    pub fn abandon(&mut self, ticket: LoadTicket) {
        if ticket.kind == LoadKind::Append {
            ticket.cancel.cancel();
        }
        self.release(&ticket);
    }

    fn release(&mut self, ticket: &LoadTicket) {
        let live_append = ticket.kind == LoadKind::Append
            && ticket.generation == self.generation
            && self.pagination.is_loading_more;
        if live_append {
            tracing::debug!(location = %ticket.location, "next page load abandoned");
            self.pagination.is_loading_more = false;
        }
    }

    /// Fetches and commits `ticket`; `None` is a no-op.
    pub async fn run(&mut self, ticket: Option<LoadTicket>) -> Result<LoadOutcome, SessionError> {
        let Some(ticket) = ticket else {
            return Ok(LoadOutcome::Skipped);
        };
        let fetcher = Arc::clone(&self.fetcher);
        let mut pending = PendingLoad {
            session: self,
            ticket,
            settled: false,
        };
        let result = pending.ticket.fetch(fetcher.as_ref()).await;
        pending.settled = true;
        let ticket = pending.ticket.clone();
        pending.session.commit(ticket, result)
    }

    pub async fn load_initial(&mut self) -> Result<LoadOutcome, SessionError> {
        let ticket = self.reload();
        self.run(ticket).await
    }

    pub async fn load_more(&mut self) -> Result<LoadOutcome, SessionError> {
        let ticket = self.begin_load_more();
        self.run(ticket).await
    }

    pub async fn open(&mut self, location: CatalogLocation) -> Result<LoadOutcome, SessionError> {
        let ticket = self.push(location);
        self.run(ticket).await
    }

    pub async fn open_breadcrumb(&mut self, index: usize) -> Result<LoadOutcome, SessionError> {
        let ticket = self.jump_to(index)?;
        self.run(ticket).await
    }

    pub async fn go_back(&mut self) -> Result<LoadOutcome, SessionError> {
        let ticket = self.back();
        self.run(ticket).await
    }

    pub async fn search_by_author(&mut self, query: &str) -> Result<LoadOutcome, SessionError> {
        let ticket = self.search(query);
        self.run(ticket).await
    }
}

// Releases the pagination guard when a `run` future is dropped before its commit.
struct PendingLoad<'s> {
    session: &'s mut NavigatorSession,
    ticket: LoadTicket,
    settled: bool,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.session.release(&self.ticket);
        }
    }
}

pub fn search_location(query: &str) -> CatalogLocation {
    let encoded = form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>();
    CatalogLocation::new(format!("/opds/search?searchTerm={encoded}"))
}
