//! IMSLP CATEGORY HARVESTER
//! Walks a category listing page by page, scrapes every linked work page and
//! appends the unseen works to a CSV file.

mod error;
mod macros;

pub mod browser;
pub mod config;
pub mod normalize;
pub mod parse;
pub mod process;
pub mod request;
pub mod schema;
pub mod store;
pub mod walker;

pub use error::{Error, Result};

pub const SITE_ROOT: &str = "https://imslp.org";
pub const SEED_URL: &str = "https://imslp.org/wiki/Category:Telemann%2C_Georg_Philipp";
pub const FILE_PATH: &str = "premium_data.csv";
pub const WEBDRIVER_URL: &str = "http://localhost:4444";

/// Links past this index on a single listing page are ignored.
pub const MAX_LINKS_PER_PAGE: usize = 300;
/// The walk stops after this many listing pages even if a "next" control exists.
pub const MAX_PAGES: usize = 10;
pub const REQUEST_DELAY_MS: u64 = 50;
pub const MATCH_CUTOFF: f64 = 0.6;
pub const REQUEST_TIMEOUT_SECS: u64 = 15;
pub const RENDER_TIMEOUT_SECS: u64 = 10;
/// Pause between scrolling the "next" control into view and clicking it.
pub const CLICK_SETTLE_MS: u64 = 500;
/// Pause after clicking "next" so the new listing can render.
pub const PAGE_SETTLE_MS: u64 = 1000;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";
