//! Browser seam
//!
//! The verifier only needs three things from a rendered page: how many
//! elements a locator matches, the page markup, and a way to let go of the
//! session. The production implementation speaks W3C WebDriver over HTTP.

use crate::error::{HealError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait Browser: Send + Sync {
    /// Start a session and navigate it to `base_url`.
    async fn open(&self, base_url: &str) -> Result<Box<dyn PageSession>>;
}

#[async_trait]
pub trait PageSession: Send + Sync {
    async fn count_matches(&self, locator: &str) -> Result<usize>;
    async fn page_source(&self) -> Result<String>;
    async fn close(&self) -> Result<()>;
}

/// XPath for anything rooted at `//` or `(//`, CSS otherwise.
pub fn locator_strategy(locator: &str) -> &'static str {
    let trimmed = locator.trim_start();
    if trimmed.starts_with("//") || trimmed.starts_with("(//") {
        "xpath"
    } else {
        "css selector"
    }
}

/// Unwrap the `value` member of a WebDriver response, turning protocol
/// errors into `HealError::Browser`.
fn response_value(status: u16, body: Value) -> Result<Value> {
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if (200..300).contains(&status) {
        return Ok(value);
    }

    let error = value["error"].as_str().unwrap_or("unknown error");
    let message = value["message"].as_str().unwrap_or("");
    Err(HealError::Browser(format!("{} {}: {}", status, error, message)))
}

pub struct WebDriverBrowser {
    client: Client,
    endpoint: String,
}

impl WebDriverBrowser {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn capabilities() -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": ["--headless=new", "--no-sandbox", "--disable-dev-shm-usage"]
                    }
                }
            }
        })
    }
}

async fn command(client: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    response_value(status, body)
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn open(&self, base_url: &str) -> Result<Box<dyn PageSession>> {
        let created = command(
            &self.client,
            Method::POST,
            &format!("{}/session", self.endpoint),
            Some(Self::capabilities()),
        )
        .await?;

        let session_id = created["sessionId"]
            .as_str()
            .ok_or_else(|| HealError::Browser("session response has no sessionId".to_string()))?;
        debug!(session = session_id, "WebDriver session created");

        let session = WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
        };

        let navigated = command(
            &self.client,
            Method::POST,
            &format!("{}/url", session.base),
            Some(json!({ "url": base_url })),
        )
        .await;

        if let Err(e) = navigated {
            // The caller never sees this session, so release it here.
            if let Err(close_err) = session.close().await {
                warn!(error = %close_err, "Failed to close session after navigation error");
            }
            return Err(e);
        }

        Ok(Box::new(session))
    }
}

pub struct WebDriverSession {
    client: Client,
    base: String,
}

#[async_trait]
impl PageSession for WebDriverSession {
    async fn count_matches(&self, locator: &str) -> Result<usize> {
        let found = command(
            &self.client,
            Method::POST,
            &format!("{}/elements", self.base),
            Some(json!({ "using": locator_strategy(locator), "value": locator })),
        )
        .await?;

        Ok(found.as_array().map(Vec::len).unwrap_or(0))
    }

    async fn page_source(&self) -> Result<String> {
        let source = command(
            &self.client,
            Method::GET,
            &format!("{}/source", self.base),
            None,
        )
        .await?;

        source
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| HealError::Browser("page source is not a string".to_string()))
    }

    async fn close(&self) -> Result<()> {
        command(&self.client, Method::DELETE, &self.base, None).await?;
        Ok(())
    }
}
