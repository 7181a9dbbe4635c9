use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The selector you are trying to scrape for is invalid. Selector: {0}")]
    ParseMissingSelector(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Couldn't start a WebDriver session: {0}")]
    WebDriverSession(#[from] fantoccini::error::NewSessionError),
    #[error("WebDriver command failed: {0}")]
    WebDriver(#[from] fantoccini::error::CmdError),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("The existing store can't be used: {0}")]
    UnusableStore(String),

    #[error("Timed out after {0:?} waiting for the listing page.")]
    RenderTimeout(std::time::Duration),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
