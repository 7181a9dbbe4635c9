use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::task::spawn_blocking;
use tracing::{info, warn};

use crate::browser::{ListingBrowser, WebDriverBrowser};
use crate::config::Config;
use crate::normalize::LabelMatcher;
use crate::parse::extract;
use crate::request::{DetailSource, HttpDetailSource};
use crate::schema::{Field, Record, RecordFields, RecordLink};
use crate::store::{self, MergeReport};
use crate::walker::{RecordVisitor, Termination, Walker};
use crate::{info_time, Result};

/// What a harvest run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    pub pages_visited: usize,
    pub termination: Termination,
    pub records: usize,
    /// Records whose page could not be fetched or parsed. They are stored by name and location only.
    pub failed: usize,
    /// `None` when nothing was harvested and the store was left alone.
    pub merge: Option<MergeReport>,
}

impl fmt::Display for HarvestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages, {} records ({} failed), stopped: {:?}",
            self.pages_visited, self.records, self.failed, self.termination
        )?;
        match &self.merge {
            Some(m) => write!(
                f,
                ", {} appended, {} already stored{}",
                m.appended,
                m.skipped,
                if m.created { ", new store" } else { "" }
            ),
            None => f.write_str(", nothing stored"),
        }
    }
}

/// Starts a browser session and harvests the configured category into the configured store.
pub async fn run(config: Config) -> Result<HarvestSummary> {
    config.validate()?;
    let details = HttpDetailSource::new(config.request_timeout())?;

    info_time!("Connecting to WebDriver at {}", config.webdriver_url);
    let mut browser =
        WebDriverBrowser::connect(&config.webdriver_url, config.headless, config.click_settle())
            .await?;

    harvest(&mut browser, &details, &config).await
}

/// Walks the listing, scrapes every record and merges the result into the store.
///
/// The browser is closed before this returns, on every path. Only a seed that cannot
/// be opened or a store that cannot be written is an error; anything that goes wrong
/// mid-walk ends the walk early and whatever was harvested is still stored.
pub async fn harvest<B, D>(browser: &mut B, details: &D, config: &Config) -> Result<HarvestSummary>
where
    B: ListingBrowser,
    D: DetailSource,
{
    let start_time = Local::now();
    info_time!("Started scraping {}", config.seed_url);

    if let Err(e) = browser.open(&config.seed_url).await {
        close(browser).await;
        return Err(e);
    }

    let mut collector = Collector::new(details, config.matcher(), config.request_delay());
    let outcome = Walker::new(config.walk_config())
        .walk(browser, &mut collector)
        .await;
    close(browser).await;

    if !outcome.termination.is_clean() {
        warn!(
            "Walk ended early ({:?}), keeping {} records",
            outcome.termination,
            collector.records.len()
        );
    }
    info_time!(
        start_time,
        "Finished scraping. Total pieces found: {}",
        collector.records.len()
    );

    let merge = if collector.records.is_empty() {
        info!("No pieces were scraped.");
        None
    } else {
        let report = store::merge(&collector.records, &config.output)?;
        info!("File '{}' saved successfully.", config.output.display());
        Some(report)
    };

    Ok(HarvestSummary {
        pages_visited: outcome.pages_visited,
        termination: outcome.termination,
        records: collector.records.len(),
        failed: collector.failed,
        merge,
    })
}

async fn close<B: ListingBrowser>(browser: &mut B) {
    if let Err(e) = browser.close().await {
        warn!("Couldn't close the browser: {e}");
    }
}

/// Scrapes each visited link into a [`Record`], one request at a time.
struct Collector<'a, D> {
    details: &'a D,
    matcher: LabelMatcher,
    delay: Duration,
    records: Vec<Record>,
    failed: usize,
}

impl<'a, D: DetailSource> Collector<'a, D> {
    fn new(details: &'a D, matcher: LabelMatcher, delay: Duration) -> Self {
        Self {
            details,
            matcher,
            delay,
            records: Vec::new(),
            failed: 0,
        }
    }

    async fn scrape(&self, link: &RecordLink) -> Result<RecordFields> {
        let html = self.details.fetch(&link.url).await?;

        let matcher = self.matcher;
        let extraction = spawn_blocking(move || extract(&html, &Field::ALL, &matcher)).await??;

        // One pause per info group, to go easy on the server.
        for _ in 0..extraction.blocks {
            tokio::time::sleep(self.delay).await;
        }
        Ok(extraction.fields)
    }
}

#[async_trait]
impl<'a, D: DetailSource> RecordVisitor for Collector<'a, D> {
    async fn visit(&mut self, link: &RecordLink, position: usize, total: usize) {
        tokio::time::sleep(self.delay).await;

        let record = match self.scrape(link).await {
            Ok(fields) => Record::new(link.clone(), fields),
            Err(e) => {
                warn!(url = %link.url, "Couldn't scrape {}: {e}", link.name);
                self.failed += 1;
                Record::absent(link.clone())
            }
        };
        self.records.push(record);
        info!("Scraped ({position}/{total}): {}", link.name);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;

    use clap::Parser;
    use url::Url;

    use super::*;
    use crate::walker::tests::FakeBrowser;
    use crate::Error;

    struct FakeDetails(HashMap<String, String>);

    #[async_trait]
    impl DetailSource for FakeDetails {
        async fn fetch(&self, url: &Url) -> Result<String> {
            self.0
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, url.to_string()).into())
        }
    }

    fn work_page(key: &str) -> String {
        format!(
            r#"<div class="wi_body" style="width:100%"><table>
                <tr><th>Key</th><td>{key}</td></tr></table></div>"#
        )
    }

    fn config(output: &std::path::Path) -> Config {
        let output = output.to_str().unwrap();
        Config::parse_from(["imslp_harvest", "--output", output, "--request-delay-ms", "0"])
    }

    #[tokio::test]
    async fn failed_records_are_kept_without_fields() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("works.csv");
        let mut browser = FakeBrowser::listing(1, 2);
        let details = FakeDetails(HashMap::from([(
            "https://imslp.org/wiki/P0_0".to_string(),
            work_page("E minor"),
        )]));

        let summary = harvest(&mut browser, &details, &config(&output)).await.unwrap();

        assert!(browser.opened && browser.closed);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.termination, Termination::LastPage);
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("E minor"));
        assert!(text.contains("https://imslp.org/wiki/P0_1"));
    }

    #[tokio::test]
    async fn unopenable_seed_closes_browser_and_skips_store() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("works.csv");
        let mut browser = FakeBrowser::listing(2, 2);
        browser.fail_open = true;
        let details = FakeDetails(HashMap::new());

        let result = harvest(&mut browser, &details, &config(&output)).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!browser.opened);
        assert!(browser.closed);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn failed_click_still_stores_earlier_pages() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("works.csv");
        let mut browser = FakeBrowser::listing(3, 2);
        browser.broken_next_on = Some(0);
        let details = FakeDetails(HashMap::from([
            ("https://imslp.org/wiki/P0_0".to_string(), work_page("C major")),
            ("https://imslp.org/wiki/P0_1".to_string(), work_page("D minor")),
        ]));

        let summary = harvest(&mut browser, &details, &config(&output)).await.unwrap();

        assert!(matches!(summary.termination, Termination::Aborted(_)));
        assert!(!summary.termination.is_clean());
        assert!(browser.closed);
        assert_eq!(summary.pages_visited, 1);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.failed, 0);
        let report = summary.merge.unwrap();
        assert!(report.created);
        assert_eq!(report.appended, 2);

        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("C major") && text.contains("D minor"));
        assert!(!text.contains("P1_0"));
    }

    #[tokio::test]
    async fn nothing_harvested_leaves_store_alone() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("works.csv");
        let mut browser = FakeBrowser::new(vec![("<html></html>".into(), false)]);
        let details = FakeDetails(HashMap::new());

        let summary = harvest(&mut browser, &details, &config(&output)).await.unwrap();

        assert_eq!(summary.termination, Termination::NoLinks);
        assert_eq!(summary.merge, None);
        assert!(browser.closed);
        assert!(!output.exists());
    }
}
