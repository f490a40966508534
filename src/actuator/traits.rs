//! Actuator traits and error types
//!
//! The actuator is the browser-automation capability set the crawl core is
//! written against. It never sees concrete selectors: every lookup is an
//! ordered list of [`Locator`]s supplied by the site profile.

use crate::actuator::locator::Locator;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Interval between element lookups while waiting for an element to appear
pub const LOCATE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Interval between condition evaluations in [`Actuator::wait_until`]
pub const CONDITION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors raised by the browser-automation layer
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("WebDriver request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error `{error}`: {message}")]
    Protocol { error: String, message: String },

    #[error("Unexpected WebDriver response: {0}")]
    UnexpectedResponse(String),

    #[error("Element is no longer attached: {0}")]
    StaleElement(String),

    #[error("Window not found: {0}")]
    NoSuchWindow(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Session is closed")]
    SessionClosed,
}

/// Result type for actuator operations
pub type ActuatorResult<T> = Result<T, ActuatorError>;

/// Opaque handle to an element located by an actuator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element {
    id: String,
}

impl Element {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// An observable condition the driver can wait for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The current URL differs from `from`
    UrlChanged { from: String },
    /// One of the locators resolves to an interactable element
    ElementPresent(Vec<Locator>),
    /// The document has finished loading
    DocumentReady,
}

/// Browser-automation capability set consumed by the crawl core
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Returns the name of this actuator implementation
    fn name(&self) -> &str;

    /// Makes a single pass over the locators in order and returns the first
    /// interactable element found
    async fn find_first(&self, locators: &[Locator]) -> ActuatorResult<Option<Element>>;

    /// Clicks an element
    async fn click(&self, element: &Element) -> ActuatorResult<()>;

    /// Clears an input element and types text into it
    async fn type_text(&self, element: &Element, text: &str) -> ActuatorResult<()>;

    /// Sends the Enter key to an element
    async fn press_enter(&self, element: &Element) -> ActuatorResult<()>;

    /// Returns whether a checkbox-like element is selected
    async fn is_selected(&self, element: &Element) -> ActuatorResult<bool>;

    /// Chooses a value in a select-like control and notifies the page
    async fn choose_option(&self, element: &Element, value: &str) -> ActuatorResult<()>;

    /// Navigates the current window to a URL
    async fn navigate_to(&self, url: &str) -> ActuatorResult<()>;

    /// Reloads the current view
    async fn refresh(&self) -> ActuatorResult<()>;

    /// Returns the URL of the current window
    async fn current_url(&self) -> ActuatorResult<String>;

    /// Returns the markup of the current page
    async fn page_source(&self) -> ActuatorResult<String>;

    /// Returns the handles of all open windows
    async fn window_handles(&self) -> ActuatorResult<Vec<String>>;

    /// Makes the given window the target of subsequent commands
    async fn switch_to_window(&self, handle: &str) -> ActuatorResult<()>;

    /// Ends the browser session
    async fn close(&self) -> ActuatorResult<()>;

    /// Returns whether the current document has finished loading
    async fn document_ready(&self) -> ActuatorResult<bool> {
        Ok(true)
    }

    /// Case-insensitive check of the page text against a set of phrases
    async fn page_contains_any(&self, phrases: &[String]) -> ActuatorResult<bool> {
        let source = self.page_source().await?.to_lowercase();
        Ok(phrases
            .iter()
            .any(|phrase| source.contains(&phrase.to_lowercase())))
    }

    /// Polls the locators until one resolves or the timeout elapses
    ///
    /// Returns `Ok(None)` when nothing was found in time; absence is not an
    /// error at this layer.
    async fn locate(
        &self,
        locators: &[Locator],
        timeout: Duration,
    ) -> ActuatorResult<Option<Element>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.find_first(locators).await? {
                return Ok(Some(element));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(LOCATE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Polls a condition until it holds or the timeout elapses
    async fn wait_until(&self, condition: &Condition, timeout: Duration) -> ActuatorResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if condition_met(self, condition).await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(CONDITION_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

/// Evaluates a condition once against an actuator
pub async fn condition_met<A>(actuator: &A, condition: &Condition) -> ActuatorResult<bool>
where
    A: Actuator + ?Sized,
{
    match condition {
        Condition::UrlChanged { from } => Ok(actuator.current_url().await? != *from),
        Condition::ElementPresent(locators) => Ok(actuator.find_first(locators).await?.is_some()),
        Condition::DocumentReady => actuator.document_ready().await,
    }
}

/// Opens a fresh actuator session per crawl unit
#[async_trait]
pub trait ActuatorFactory: Send + Sync {
    /// Opens a session whose browser downloads land in `download_dir`
    async fn open(&self, download_dir: &Path) -> ActuatorResult<Box<dyn Actuator>>;
}
