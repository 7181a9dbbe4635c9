use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::normalize::LabelMatcher;
use crate::walker::WalkConfig;
use crate::{
    Error, Result, CLICK_SETTLE_MS, FILE_PATH, MATCH_CUTOFF, MAX_LINKS_PER_PAGE, MAX_PAGES,
    PAGE_SETTLE_MS, RENDER_TIMEOUT_SECS, REQUEST_DELAY_MS, REQUEST_TIMEOUT_SECS, SEED_URL,
    SITE_ROOT, WEBDRIVER_URL,
};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "imslp_harvest",
    about = "Scrape an IMSLP category into a CSV file, appending only unseen works"
)]
pub struct Config {
    /// Category listing to start from
    #[arg(long, default_value = SEED_URL)]
    pub seed_url: Url,

    /// CSV file to create or append to
    #[arg(short, long, default_value = FILE_PATH)]
    pub output: PathBuf,

    /// Base that relative record links are resolved against
    #[arg(long, default_value = SITE_ROOT)]
    pub site_root: Url,

    /// Max record links taken from one listing page
    #[arg(long, default_value_t = MAX_LINKS_PER_PAGE)]
    pub max_links_per_page: usize,

    /// Max listing pages to walk
    #[arg(short = 'n', long, default_value_t = MAX_PAGES)]
    pub max_pages: usize,

    /// Pause before each work page request and after each info group (ms)
    #[arg(long, default_value_t = REQUEST_DELAY_MS)]
    pub request_delay_ms: u64,

    /// Minimum similarity for a page label to count as a schema field
    #[arg(long, default_value_t = MATCH_CUTOFF)]
    pub match_cutoff: f64,

    /// Timeout for each work page request (s)
    #[arg(long, default_value_t = REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Wait for a listing page to render and for its "next" control to be clickable (s)
    #[arg(long, default_value_t = RENDER_TIMEOUT_SECS)]
    pub render_timeout_secs: u64,

    /// WebDriver server (chromedriver, geckodriver, ...)
    #[arg(long, default_value = WEBDRIVER_URL)]
    pub webdriver_url: String,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Log per-block detail
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.match_cutoff) {
            return Err(Error::InvalidConfig(format!(
                "match cutoff must be within [0, 1], got {}",
                self.match_cutoff
            )));
        }
        if self.max_pages == 0 {
            return Err(Error::InvalidConfig("max pages must be at least 1".into()));
        }
        if self.max_links_per_page == 0 {
            return Err(Error::InvalidConfig(
                "max links per page must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn walk_config(&self) -> WalkConfig {
        WalkConfig {
            site_root: self.site_root.clone(),
            max_links_per_page: self.max_links_per_page,
            max_pages: self.max_pages,
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            page_settle: Duration::from_millis(PAGE_SETTLE_MS),
        }
    }

    pub fn matcher(&self) -> LabelMatcher {
        LabelMatcher::new(self.match_cutoff)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(CLICK_SETTLE_MS)
    }
}
