use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::{Result, USER_AGENT};

/// Where work pages come from.
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// Returns the HTML of the page at `url`.
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// Plain HTTP GET with a browser-like user agent and a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpDetailSource {
    // Client uses Arc so we can clone cheaply
    client: Client,
}

impl HttpDetailSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DetailSource for HttpDetailSource {
    async fn fetch(&self, url: &Url) -> Result<String> {
        let res = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        let html = res.text().await?;
        Ok(html)
    }
}
