//! W3C WebDriver actuator
//!
//! This module talks the WebDriver HTTP protocol to a chromedriver-compatible
//! endpoint, including:
//! - Creating a session whose downloads land in the crawl unit's directory
//! - Mapping locator strategies onto WebDriver lookup strategies
//! - Falling back to a script click when a native click is intercepted
//! - Deleting the session on close

use crate::actuator::locator::{Locator, Strategy};
use crate::actuator::traits::{Actuator, ActuatorError, ActuatorFactory, ActuatorResult, Element};
use crate::config::BrowserConfig;
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Key under which WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver code point for the Enter key
const ENTER_KEY: &str = "\u{E007}";

const SCRIPT_CLICK: &str =
    "arguments[0].scrollIntoView({block: 'center'}); arguments[0].click();";

const SCRIPT_CHOOSE_OPTION: &str = "arguments[0].value = arguments[1]; \
     arguments[0].dispatchEvent(new Event('change', { bubbles: true }));";

const SCRIPT_READY_STATE: &str = "return document.readyState";

/// Builds the new-session payload for the configured browser
///
/// The download directory is handed to the browser so bulk downloads land
/// where the download monitor is watching.
pub fn session_capabilities(config: &BrowserConfig, download_dir: &Path) -> Value {
    let args: Vec<&str> = if config.is_headless() {
        vec![
            "--headless=new",
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
        ]
    } else {
        vec!["--start-maximized", "--disable-extensions"]
    };

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": config.browser_name,
                "pageLoadStrategy": "eager",
                "goog:chromeOptions": {
                    "args": args,
                    "prefs": {
                        "download.default_directory": download_dir.to_string_lossy(),
                        "download.prompt_for_download": false,
                        "download.directory_upgrade": true,
                        "plugins.always_open_pdf_externally": true
                    }
                }
            }
        }
    })
}

/// Opens WebDriver sessions for crawl units
pub struct WebDriverFactory {
    config: BrowserConfig,
    client: Client,
}

impl WebDriverFactory {
    /// Creates a factory for the given browser configuration
    pub fn new(config: BrowserConfig) -> ActuatorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.page_load_timeout_secs + 30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ActuatorFactory for WebDriverFactory {
    async fn open(&self, download_dir: &Path) -> ActuatorResult<Box<dyn Actuator>> {
        // Chrome ignores relative download directories
        let download_dir =
            std::fs::canonicalize(download_dir).unwrap_or_else(|_| download_dir.to_path_buf());
        let session = WebDriverSession::start(self.client.clone(), &self.config, &download_dir).await?;
        Ok(Box::new(session))
    }
}

/// A live WebDriver session
pub struct WebDriverSession {
    client: Client,
    base_url: String,
    session_id: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    /// Creates a new browser session
    pub async fn start(
        client: Client,
        config: &BrowserConfig,
        download_dir: &Path,
    ) -> ActuatorResult<Self> {
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();
        let response = client
            .post(format!("{}/session", base_url))
            .json(&session_capabilities(config, download_dir))
            .send()
            .await?;
        let value = read_value(response).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ActuatorError::UnexpectedResponse(format!("missing sessionId in {}", value))
            })?
            .to_string();

        let session = Self {
            client,
            base_url,
            session_id,
            closed: AtomicBool::new(false),
        };

        let page_load_ms = config.page_load_timeout_secs * 1000;
        session
            .post("/timeouts", json!({ "pageLoad": page_load_ms }))
            .await?;

        tracing::info!(
            "WebDriver session {} started (headless: {}, downloads: {})",
            session.session_id,
            config.is_headless(),
            download_dir.display()
        );

        Ok(session)
    }

    /// Returns the WebDriver session ID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> ActuatorResult<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ActuatorError::SessionClosed);
        }

        let mut request = self.client.request(method, self.session_url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        read_value(request.send().await?).await
    }

    async fn get(&self, path: &str) -> ActuatorResult<Value> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> ActuatorResult<Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> ActuatorResult<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn find_elements(&self, locator: &Locator) -> ActuatorResult<Vec<Element>> {
        let (using, value) = webdriver_selector(locator);
        let found = match self
            .post("/elements", json!({ "using": using, "value": value }))
            .await
        {
            Ok(found) => found,
            Err(ActuatorError::Protocol { error, message }) if error == "invalid selector" => {
                tracing::warn!("Skipping invalid locator {}: {}", locator, message);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let elements = found
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
                    .map(Element::new)
                    .collect()
            })
            .unwrap_or_default();
        Ok(elements)
    }

    async fn element_flag(&self, element: &Element, flag: &str) -> ActuatorResult<bool> {
        let value = self
            .get(&format!("/element/{}/{}", element.id(), flag))
            .await?;
        value.as_bool().ok_or_else(|| {
            ActuatorError::UnexpectedResponse(format!("expected boolean for {}, got {}", flag, value))
        })
    }

    async fn is_interactable(&self, element: &Element) -> ActuatorResult<bool> {
        let result: ActuatorResult<bool> = async {
            Ok(self.element_flag(element, "displayed").await?
                && self.element_flag(element, "enabled").await?)
        }
        .await;

        match result {
            Err(ActuatorError::StaleElement(_)) => Ok(false),
            other => other,
        }
    }
}

#[async_trait]
impl Actuator for WebDriverSession {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn find_first(&self, locators: &[Locator]) -> ActuatorResult<Option<Element>> {
        for locator in locators {
            for element in self.find_elements(locator).await? {
                if self.is_interactable(&element).await? {
                    tracing::trace!("Located element {} via {}", element.id(), locator);
                    return Ok(Some(element));
                }
            }
        }
        Ok(None)
    }

    async fn click(&self, element: &Element) -> ActuatorResult<()> {
        match self
            .post(&format!("/element/{}/click", element.id()), json!({}))
            .await
        {
            Ok(_) => Ok(()),
            Err(ActuatorError::Protocol { error, message })
                if error == "element click intercepted" || error == "element not interactable" =>
            {
                tracing::debug!("Native click failed ({}), using script click", message);
                self.execute(SCRIPT_CLICK, vec![element_arg(element)])
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    async fn type_text(&self, element: &Element, text: &str) -> ActuatorResult<()> {
        self.post(&format!("/element/{}/clear", element.id()), json!({}))
            .await?;
        self.post(
            &format!("/element/{}/value", element.id()),
            json!({ "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn press_enter(&self, element: &Element) -> ActuatorResult<()> {
        self.post(
            &format!("/element/{}/value", element.id()),
            json!({ "text": ENTER_KEY }),
        )
        .await?;
        Ok(())
    }

    async fn is_selected(&self, element: &Element) -> ActuatorResult<bool> {
        self.element_flag(element, "selected").await
    }

    async fn choose_option(&self, element: &Element, value: &str) -> ActuatorResult<()> {
        self.execute(SCRIPT_CHOOSE_OPTION, vec![element_arg(element), json!(value)])
            .await?;
        Ok(())
    }

    async fn navigate_to(&self, url: &str) -> ActuatorResult<()> {
        self.post("/url", json!({ "url": url }))
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ActuatorError::Protocol { message, .. } => ActuatorError::Navigation {
                    url: url.to_string(),
                    reason: message,
                },
                other => other,
            })
    }

    async fn refresh(&self) -> ActuatorResult<()> {
        self.post("/refresh", json!({})).await?;
        Ok(())
    }

    async fn current_url(&self) -> ActuatorResult<String> {
        string_value(self.get("/url").await?)
    }

    async fn page_source(&self) -> ActuatorResult<String> {
        string_value(self.get("/source").await?)
    }

    async fn window_handles(&self) -> ActuatorResult<Vec<String>> {
        let value = self.get("/window/handles").await?;
        let handles = value
            .as_array()
            .ok_or_else(|| ActuatorError::UnexpectedResponse(format!("expected array, got {}", value)))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        Ok(handles)
    }

    async fn switch_to_window(&self, handle: &str) -> ActuatorResult<()> {
        self.post("/window", json!({ "handle": handle })).await?;
        Ok(())
    }

    async fn document_ready(&self) -> ActuatorResult<bool> {
        let state = self.execute(SCRIPT_READY_STATE, Vec::new()).await?;
        Ok(state.as_str() == Some("complete"))
    }

    async fn close(&self) -> ActuatorResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let response = self
            .client
            .delete(format!("{}/session/{}", self.base_url, self.session_id))
            .send()
            .await?;
        read_value(response).await?;
        tracing::info!("WebDriver session {} closed", self.session_id);
        Ok(())
    }
}

/// Unwraps the `value` member of a WebDriver response, mapping error payloads
async fn read_value(response: Response) -> ActuatorResult<Value> {
    let status = response.status();
    let body: Value = response.json().await?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Err(match error.as_str() {
        "stale element reference" => ActuatorError::StaleElement(message),
        "no such window" => ActuatorError::NoSuchWindow(message),
        _ => ActuatorError::Protocol { error, message },
    })
}

fn string_value(value: Value) -> ActuatorResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ActuatorError::UnexpectedResponse(format!("expected string, got {}", value)))
}

fn element_arg(element: &Element) -> Value {
    json!({ ELEMENT_KEY: element.id() })
}

/// Maps a locator onto a WebDriver `(using, value)` pair
fn webdriver_selector(locator: &Locator) -> (&'static str, String) {
    match locator.by {
        Strategy::Css => ("css selector", locator.value.clone()),
        Strategy::Xpath => ("xpath", locator.value.clone()),
        Strategy::LinkText => ("link text", locator.value.clone()),
        Strategy::PartialLinkText => ("partial link text", locator.value.clone()),
        Strategy::Name => (
            "css selector",
            format!("[name=\"{}\"]", css_escape(&locator.value)),
        ),
        Strategy::Id => (
            "css selector",
            format!("[id=\"{}\"]", css_escape(&locator.value)),
        ),
    }
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn browser_config(url: &str) -> BrowserConfig {
        BrowserConfig {
            webdriver_url: url.to_string(),
            headless: Some(true),
            browser_name: "chrome".to_string(),
            page_load_timeout_secs: 30,
        }
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "s1", "capabilities": {} }
            })))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/session/s1/timeouts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(server)
            .await;
    }

    async fn started_session(server: &MockServer) -> WebDriverSession {
        mount_session(server).await;
        WebDriverSession::start(
            Client::new(),
            &browser_config(&server.uri()),
            Path::new("/tmp/downloads"),
        )
        .await
        .unwrap()
    }

    fn element_list(ids: &[&str]) -> ResponseTemplate {
        let items: Vec<Value> = ids.iter().map(|id| json!({ ELEMENT_KEY: id })).collect();
        ResponseTemplate::new(200).set_body_json(json!({ "value": items }))
    }

    fn flag(value: bool) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "value": value }))
    }

    #[test]
    fn test_capabilities_carry_download_directory() {
        let caps = session_capabilities(&browser_config("http://localhost:9515"), Path::new("/data/2024"));
        let options = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"];
        assert_eq!(options["prefs"]["download.default_directory"], "/data/2024");
        assert_eq!(options["prefs"]["download.prompt_for_download"], false);
        assert!(options["args"]
            .as_array()
            .unwrap()
            .contains(&json!("--headless=new")));
    }

    #[test]
    fn test_windowed_capabilities() {
        let mut config = browser_config("http://localhost:9515");
        config.headless = Some(false);
        let caps = session_capabilities(&config, Path::new("/data"));
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap()
            .clone();
        assert!(args.contains(&json!("--start-maximized")));
        assert!(!args.contains(&json!("--headless=new")));
    }

    #[test]
    fn test_name_and_id_map_to_css() {
        assert_eq!(
            webdriver_selector(&Locator::name("user_id")),
            ("css selector", "[name=\"user_id\"]".to_string())
        );
        assert_eq!(
            webdriver_selector(&Locator::id("a\"b")),
            ("css selector", "[id=\"a\\\"b\"]".to_string())
        );
        assert_eq!(
            webdriver_selector(&Locator::partial_link_text("IEEE")).0,
            "partial link text"
        );
    }

    #[tokio::test]
    async fn test_factory_opens_session_with_download_directory() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let canonical = std::fs::canonicalize(dir.path()).unwrap();

        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({
                "capabilities": { "alwaysMatch": { "goog:chromeOptions": { "prefs": {
                    "download.default_directory": canonical.to_string_lossy()
                }}}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "s1", "capabilities": {} }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/timeouts"))
            .and(body_partial_json(json!({ "pageLoad": 30000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let factory = WebDriverFactory::new(browser_config(&server.uri())).unwrap();
        let actuator = factory.open(dir.path()).await.unwrap();
        assert_eq!(actuator.name(), "webdriver");
    }

    #[tokio::test]
    async fn test_find_first_skips_hidden_elements() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/elements"))
            .respond_with(element_list(&["e1", "e2"]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/element/e1/displayed"))
            .respond_with(flag(false))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/element/e2/displayed"))
            .respond_with(flag(true))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/element/e2/enabled"))
            .respond_with(flag(true))
            .mount(&server)
            .await;

        let found = session
            .find_first(&[Locator::css("button.download")])
            .await
            .unwrap();
        assert_eq!(found, Some(Element::new("e2")));
    }

    #[tokio::test]
    async fn test_find_first_falls_through_locators_in_order() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/elements"))
            .and(body_partial_json(json!({ "using": "link text" })))
            .respond_with(element_list(&[]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/elements"))
            .and(body_partial_json(json!({
                "using": "css selector",
                "value": "[name=\"user_id\"]"
            })))
            .respond_with(element_list(&["e3"]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/element/e3/displayed"))
            .respond_with(flag(true))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/element/e3/enabled"))
            .respond_with(flag(true))
            .mount(&server)
            .await;

        let found = session
            .find_first(&[Locator::link_text("Login"), Locator::name("user_id")])
            .await
            .unwrap();
        assert_eq!(found, Some(Element::new("e3")));
    }

    #[tokio::test]
    async fn test_navigation_error_is_mapped() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/url"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": {
                    "error": "unknown error",
                    "message": "net::ERR_NAME_NOT_RESOLVED"
                }
            })))
            .mount(&server)
            .await;

        let err = session
            .navigate_to("https://unreachable.invalid/")
            .await
            .unwrap_err();
        match err {
            ActuatorError::Navigation { url, reason } => {
                assert_eq!(url, "https://unreachable.invalid/");
                assert!(reason.contains("ERR_NAME_NOT_RESOLVED"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_page_contains_any_is_case_insensitive() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("GET"))
            .and(path("/session/s1/source"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": "<html><p>The Seat LIMIT has been reached</p></html>"
            })))
            .mount(&server)
            .await;

        assert!(session
            .page_contains_any(&["seat limit".to_string()])
            .await
            .unwrap());
        assert!(!session
            .page_contains_any(&["too many users".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_click_falls_back_to_script() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/element/e1/click"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "value": { "error": "element click intercepted", "message": "overlay" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/execute/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        session.click(&Element::new("e1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_deletes_session_once() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/session/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(matches!(
            session.current_url().await,
            Err(ActuatorError::SessionClosed)
        ));
    }
}
