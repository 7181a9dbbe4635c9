//! Paginated listing traversal.
//!
//! The walk is a state machine:
//! `FetchingPage -> ExtractingLinks -> VisitingRecords -> SeekingNext -> FetchingPage | Done`.
//! Every transition takes the current [`WalkState`] and [`PageCursor`] and returns the
//! next pair, so each one can be driven on its own against a fake [`ListingBrowser`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tracing::{info, warn};
use url::Url;

use crate::browser::ListingBrowser;
use crate::parse::listing_links;
use crate::schema::RecordLink;
use crate::{info_time, Error};

/// Partial link text of the "next page" control.
pub const NEXT_TEXT: &str = "next";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkConfig {
    pub site_root: Url,
    pub max_links_per_page: usize,
    pub max_pages: usize,
    pub render_timeout: Duration,
    pub page_settle: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkState {
    FetchingPage,
    ExtractingLinks { document: String },
    VisitingRecords { links: Vec<RecordLink> },
    SeekingNext,
    Done(Termination),
}

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The listing held no record links: unrecognized structure or end of content.
    NoLinks,
    /// No "next" control on the last visited page.
    LastPage,
    /// The page ceiling was reached.
    PageCeiling,
    /// The listing did not render in time. Records visited so far are kept.
    TimedOut,
    /// The browser failed mid-walk. Records visited so far are kept.
    Aborted(String),
}

impl Termination {
    fn from_error(e: Error) -> Self {
        match e {
            Error::RenderTimeout(_) => Termination::TimedOut,
            e => Termination::Aborted(e.to_string()),
        }
    }

    /// Whether the walk ended on its own rather than on a fault.
    pub fn is_clean(&self) -> bool {
        !matches!(self, Termination::TimedOut | Termination::Aborted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// 1-based index of the listing page the browser shows.
    pub page: usize,
    /// Listing pages fetched so far.
    pub pages_visited: usize,
    /// Every record link found so far, in discovery order.
    pub links: Vec<RecordLink>,
    /// Whether another listing page will be fetched.
    pub more_pages: bool,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            page: 1,
            pages_visited: 0,
            links: Vec::new(),
            more_pages: true,
        }
    }
}

/// Receives every record link of a listing page, in order.
#[async_trait]
pub trait RecordVisitor: Send {
    /// `position` is 1-based within the current page's `total` links.
    async fn visit(&mut self, link: &RecordLink, position: usize, total: usize);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    pub termination: Termination,
    pub pages_visited: usize,
    pub links_found: usize,
}

pub struct Walker {
    config: WalkConfig,
}

impl Walker {
    pub fn new(config: WalkConfig) -> Self {
        Self { config }
    }

    /// Runs the state machine from the currently opened listing page until `Done`.
    ///
    /// The walk never fails: faults end it early and are reported in the outcome.
    pub async fn walk<B, V>(&self, browser: &mut B, visitor: &mut V) -> WalkOutcome
    where
        B: ListingBrowser,
        V: RecordVisitor,
    {
        let mut state = WalkState::FetchingPage;
        let mut cursor = PageCursor::default();

        loop {
            if let WalkState::Done(termination) = state {
                return WalkOutcome {
                    termination,
                    pages_visited: cursor.pages_visited,
                    links_found: cursor.links.len(),
                };
            }
            (state, cursor) = self.step(browser, visitor, state, cursor).await;
        }
    }

    /// Performs a single transition.
    pub async fn step<B, V>(
        &self,
        browser: &mut B,
        visitor: &mut V,
        state: WalkState,
        cursor: PageCursor,
    ) -> (WalkState, PageCursor)
    where
        B: ListingBrowser,
        V: RecordVisitor,
    {
        match state {
            WalkState::FetchingPage => self.fetch_page(browser, cursor).await,
            WalkState::ExtractingLinks { document } => self.extract_links(&document, cursor),
            WalkState::VisitingRecords { links } => visit_records(visitor, links, cursor).await,
            WalkState::SeekingNext => self.seek_next(browser, cursor).await,
            done @ WalkState::Done(_) => (done, cursor),
        }
    }

    pub async fn fetch_page<B: ListingBrowser>(
        &self,
        browser: &mut B,
        mut cursor: PageCursor,
    ) -> (WalkState, PageCursor) {
        info!("Scraping page {}...", cursor.page);

        let document = match browser.wait_ready(self.config.render_timeout).await {
            Ok(()) => browser.document().await,
            Err(e) => Err(e),
        };
        match document {
            Ok(document) => {
                cursor.pages_visited += 1;
                (WalkState::ExtractingLinks { document }, cursor)
            }
            Err(e) => {
                warn!("Couldn't load listing page {}: {e}. Aborting.", cursor.page);
                cursor.more_pages = false;
                (WalkState::Done(Termination::from_error(e)), cursor)
            }
        }
    }

    pub fn extract_links(&self, document: &str, mut cursor: PageCursor) -> (WalkState, PageCursor) {
        let links = match listing_links(
            document,
            &self.config.site_root,
            self.config.max_links_per_page,
        ) {
            Ok(links) => links,
            Err(e) => {
                cursor.more_pages = false;
                return (WalkState::Done(Termination::Aborted(e.to_string())), cursor);
            }
        };

        if links.is_empty() {
            info!("Couldn't find record links on page {}.", cursor.page);
            cursor.more_pages = false;
            return (WalkState::Done(Termination::NoLinks), cursor);
        }

        cursor.links.extend(links.iter().cloned());
        (WalkState::VisitingRecords { links }, cursor)
    }

    pub async fn seek_next<B: ListingBrowser>(
        &self,
        browser: &mut B,
        mut cursor: PageCursor,
    ) -> (WalkState, PageCursor) {
        if cursor.pages_visited >= self.config.max_pages {
            info!("Reached the ceiling of {} pages.", self.config.max_pages);
            cursor.more_pages = false;
            return (WalkState::Done(Termination::PageCeiling), cursor);
        }

        let activated = match browser.find_next(NEXT_TEXT).await {
            Ok(Some(control)) => {
                match browser
                    .wait_interactable(&control, self.config.render_timeout)
                    .await
                {
                    Ok(()) => browser.activate(control).await,
                    Err(e) => Err(e),
                }
            }
            Ok(None) => {
                info!("'{NEXT_TEXT}' control not found. Assuming last page reached.");
                cursor.more_pages = false;
                return (WalkState::Done(Termination::LastPage), cursor);
            }
            Err(e) => Err(e),
        };

        if let Err(e) = activated {
            warn!("Couldn't move past page {}: {e}. Aborting.", cursor.page);
            cursor.more_pages = false;
            return (WalkState::Done(Termination::from_error(e)), cursor);
        }

        tokio::time::sleep(self.config.page_settle).await;
        cursor.page += 1;
        (WalkState::FetchingPage, cursor)
    }
}

async fn visit_records<V: RecordVisitor>(
    visitor: &mut V,
    links: Vec<RecordLink>,
    cursor: PageCursor,
) -> (WalkState, PageCursor) {
    let start_time = Local::now();
    let total = links.len();
    for (i, link) in links.iter().enumerate() {
        visitor.visit(link, i + 1, total).await;
    }
    info_time!(
        start_time,
        "Found {} links on page {}. Total links so far: {}",
        total,
        cursor.page,
        cursor.links.len()
    );
    (WalkState::SeekingNext, cursor)
}
