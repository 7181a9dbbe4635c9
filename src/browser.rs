//! The scripted browser that drives client-side pagination of a listing.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::parse::LISTING_SELECTOR;
use crate::{Error, Result};

/// How often a control's readiness is re-checked.
const READY_POLL: Duration = Duration::from_millis(100);

/// The narrow set of browser capabilities the pagination walker needs.
#[async_trait]
pub trait ListingBrowser: Send {
    /// Handle to a located "next page" control.
    type Control: Send;

    /// Navigates to the seed listing.
    async fn open(&mut self, url: &Url) -> Result<()>;

    /// Waits until the listing content is present.
    ///
    /// Fails with [`Error::RenderTimeout`] if it does not show up within `timeout`.
    async fn wait_ready(&mut self, timeout: Duration) -> Result<()>;

    /// The currently rendered listing document.
    async fn document(&mut self) -> Result<String>;

    /// Locates a link whose text contains `text`. `Ok(None)` if there is none.
    async fn find_next(&mut self, text: &str) -> Result<Option<Self::Control>>;

    /// Waits until the control is displayed and enabled.
    ///
    /// Fails with [`Error::RenderTimeout`] if it isn't within `timeout`.
    async fn wait_interactable(&mut self, control: &Self::Control, timeout: Duration) -> Result<()>;

    /// Brings the control into view and clicks it.
    async fn activate(&mut self, control: Self::Control) -> Result<()>;

    /// Ends the session.
    async fn close(&mut self) -> Result<()>;
}

/// A WebDriver session (chromedriver, geckodriver, ...).
pub struct WebDriverBrowser {
    client: Client,
    click_settle: Duration,
}

impl WebDriverBrowser {
    pub async fn connect(webdriver_url: &str, headless: bool, click_settle: Duration) -> Result<Self> {
        let mut caps = serde_json::Map::new();
        if headless {
            caps.insert(
                "goog:chromeOptions".to_string(),
                json!({ "args": ["--headless=new", "--disable-gpu"] }),
            );
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": ["-headless"] }));
        }

        let mut builder = ClientBuilder::native();
        builder.capabilities(caps);
        let client = builder.connect(webdriver_url).await?;
        debug!(webdriver_url, headless, "WebDriver session started");

        Ok(Self {
            client,
            click_settle,
        })
    }
}

#[async_trait]
impl ListingBrowser for WebDriverBrowser {
    type Control = Element;

    async fn open(&mut self, url: &Url) -> Result<()> {
        self.client.goto(url.as_str()).await?;
        Ok(())
    }

    async fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(LISTING_SELECTOR))
            .await
        {
            Ok(_) => Ok(()),
            Err(CmdError::WaitTimeout) => Err(Error::RenderTimeout(timeout)),
            Err(e) => Err(e.into()),
        }
    }

    async fn document(&mut self) -> Result<String> {
        Ok(self.client.source().await?)
    }

    async fn find_next(&mut self, text: &str) -> Result<Option<Element>> {
        let xpath = format!("//a[contains(., '{text}')]");
        let mut found = self.client.find_all(Locator::XPath(&xpath)).await?;
        if found.is_empty() {
            return Ok(None);
        }
        Ok(Some(found.swap_remove(0)))
    }

    async fn wait_interactable(&mut self, control: &Element, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if control.is_displayed().await? && control.is_enabled().await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::RenderTimeout(timeout));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn activate(&mut self, control: Element) -> Result<()> {
        let arg = serde_json::to_value(&control)?;
        self.client
            .execute("arguments[0].scrollIntoView(true);", vec![arg])
            .await?;
        tokio::time::sleep(self.click_settle).await;
        control.click().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.client.clone().close().await?;
        Ok(())
    }
}
